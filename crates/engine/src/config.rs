use std::{thread, time::Duration};

use crate::error::PipelineError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 500_000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5_000;
pub const DEFAULT_BATCH_PERIOD: Duration = Duration::from_millis(500);
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// What a scheduler tick does when the queue has records but no worker is ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaturationPolicy {
    /// Drain anyway and count the batch as failed.
    #[default]
    Drop,
    /// Leave the records queued until a worker frees up.
    Hold,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Intake queue size at which `enqueue` starts rejecting.
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    /// Scheduler tick interval.
    pub batch_period: Duration,
    pub worker_count: usize,
    /// Begin shutdown once this many records have been processed.
    pub max_requests: Option<u64>,
    /// How long a dispatched batch may stay unacknowledged.
    pub dispatch_timeout: Duration,
    /// How long shutdown waits for workers to acknowledge `Terminate`.
    pub shutdown_grace: Duration,
    /// How long `Pipeline::start` waits for the first worker to connect its sink.
    pub startup_timeout: Duration,
    pub respawn_workers: bool,
    pub saturation: SaturationPolicy,
}

pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_period: DEFAULT_BATCH_PERIOD,
            worker_count: default_worker_count(),
            max_requests: None,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            respawn_workers: true,
            saturation: SaturationPolicy::Drop,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        if self.max_batch_size == 0 {
            return invalid("max_batch_size must be at least 1");
        }
        if self.batch_period.is_zero() {
            return invalid("batch_period must be non-zero");
        }
        if self.worker_count == 0 {
            return invalid("worker_count must be at least 1");
        }
        if self.dispatch_timeout.is_zero() {
            return invalid("dispatch_timeout must be non-zero");
        }
        if self.startup_timeout.is_zero() {
            return invalid("startup_timeout must be non-zero");
        }
        if self.max_requests == Some(0) {
            return invalid("max_requests must be at least 1 when set");
        }
        Ok(())
    }
}
