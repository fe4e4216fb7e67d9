use crate::pool::{WorkerHandle, WorkerStatus};
use crate::worker::WorkerId;

/// Picks the worker that receives the next batch.
///
/// Exactly one worker per batch; `None` means nobody can take it.
pub trait DispatchPolicy: Send {
    fn select(&mut self, workers: &[WorkerHandle]) -> Option<WorkerId>;
}

/// Round-robin over idle workers. Busy workers (one unacknowledged batch)
/// and workers that are starting or gone are skipped.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DispatchPolicy for RoundRobin {
    fn select(&mut self, workers: &[WorkerHandle]) -> Option<WorkerId> {
        let n = workers.len();
        if n == 0 {
            return None;
        }

        (0..n)
            .map(|offset| (self.next + offset) % n)
            .find(|&i| workers[i].status() == WorkerStatus::Ready)
            .inspect(|&i| self.next = (i + 1) % n)
    }
}
