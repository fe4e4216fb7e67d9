mod config;
mod dispatch;
mod error;
mod gateway;
mod pipeline;
mod pool;
mod progress;
mod queue;
mod scheduler;
mod shutdown;
mod sink;
mod worker;

pub use config::{
    DEFAULT_BATCH_PERIOD, DEFAULT_DISPATCH_TIMEOUT, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_TIMEOUT, PipelineConfig,
    SaturationPolicy, default_worker_count,
};
pub use dispatch::{DispatchPolicy, RoundRobin};
pub use error::PipelineError;
pub use gateway::{IngressGateway, StreamSession};
pub use pipeline::Pipeline;
pub use pool::{WorkerHandle, WorkerPool, WorkerStatus};
pub use progress::{ProgressCounters, ProgressTracker};
pub use queue::{Admission, IntakeQueue, QueueCounters};
pub use scheduler::{BatchScheduler, TickOutcome};
pub use shutdown::{ShutdownCoordinator, ShutdownPhase};
pub use sink::{
    FileSink, FileSinkConnector, MemorySink, Sink, SinkConnector, StoredRecord, read_file_sink,
};
pub use worker::{WorkerEvent, WorkerEventKind, WorkerId};

pub use sluice_protocol::{Batch, IngestStatus, Record, StreamAck};

#[cfg(test)]
mod test_support;
