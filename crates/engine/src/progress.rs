use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    pub total_processed: u64,
    pub total_failed: u64,
}

impl ProgressCounters {
    pub fn total(&self) -> u64 {
        self.total_processed + self.total_failed
    }
}

/// Aggregates per-batch outcomes reported by workers.
///
/// Both counters only ever grow.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    processed: AtomicU64,
    failed: AtomicU64,
    max_requests: Option<u64>,
}

impl ProgressTracker {
    pub fn new(max_requests: Option<u64>) -> Self {
        Self {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            max_requests,
        }
    }

    pub fn on_worker_report(&self, count: u64, failed: bool) {
        let counter = if failed { &self.failed } else { &self.processed };
        counter.fetch_add(count, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> ProgressCounters {
        ProgressCounters {
            total_processed: self.processed.load(Ordering::Acquire),
            total_failed: self.failed.load(Ordering::Acquire),
        }
    }

    /// True once `max_requests` is configured and has been met.
    pub fn threshold_reached(&self) -> bool {
        self.max_requests
            .is_some_and(|max| self.processed.load(Ordering::Acquire) >= max)
    }
}
