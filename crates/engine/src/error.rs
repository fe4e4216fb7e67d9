use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy of the ingestion pipeline.
///
/// Only `IngressOverload` is ever visible to a caller, and then only as a
/// `Rejected` status. Batch- and worker-level failures are logged and counted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("intake queue is full (capacity {capacity})")]
    IngressOverload { capacity: usize },

    #[error("batch {batch} failed to persist: {reason}")]
    PersistenceFailure { batch: u64, reason: String },

    #[error("worker {worker} exited unexpectedly with {lost} records in flight")]
    WorkerCrash { worker: usize, lost: usize },

    #[error("failed to bind {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {worker} did not acknowledge terminate within {grace:?}")]
    ShutdownTimeout { worker: usize, grace: Duration },

    #[error("none of {workers} workers connected to the sink within {timeout:?}")]
    StartupFailure { workers: usize, timeout: Duration },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
