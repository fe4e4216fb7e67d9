use log::{debug, warn};
use sluice_protocol::Batch;

use crate::config::SaturationPolicy;
use crate::dispatch::DispatchPolicy;
use crate::pool::WorkerPool;
use crate::progress::ProgressTracker;
use crate::queue::IntakeQueue;
use crate::worker::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue empty; nothing to do.
    Idle,
    /// No worker ready and the saturation policy keeps records queued.
    Held { queued: usize },
    Dispatched {
        worker: WorkerId,
        seq: u64,
        len: usize,
    },
    /// No worker could take the batch; its records were counted as failed.
    Dropped { seq: u64, len: usize },
}

/// Turns timer ticks into batches. Never waits on a previous dispatch.
pub struct BatchScheduler {
    max_batch_size: usize,
    saturation: SaturationPolicy,
    next_seq: u64,
}

impl BatchScheduler {
    pub fn new(max_batch_size: usize, saturation: SaturationPolicy) -> Self {
        Self {
            max_batch_size,
            saturation,
            next_seq: 0,
        }
    }

    /// Batches drained so far.
    pub fn batches_drained(&self) -> u64 {
        self.next_seq
    }

    pub fn on_tick(
        &mut self,
        queue: &IntakeQueue,
        pool: &mut WorkerPool,
        policy: &mut dyn DispatchPolicy,
        progress: &ProgressTracker,
    ) -> TickOutcome {
        if queue.is_empty() {
            return TickOutcome::Idle;
        }

        if self.saturation == SaturationPolicy::Hold && !pool.has_ready() {
            let queued = queue.len();
            debug!("no ready worker; holding {queued} queued records");
            return TickOutcome::Held { queued };
        }

        let records = queue.drain(self.max_batch_size);
        if records.is_empty() {
            return TickOutcome::Idle;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let batch = Batch { seq, records };
        let len = batch.len();

        if let Some(worker) = policy.select(pool.workers())
            && pool.dispatch(worker, batch)
        {
            debug!("batch {seq} ({len} records) -> worker {worker}");
            return TickOutcome::Dispatched { worker, seq, len };
        }

        progress.on_worker_report(len as u64, true);
        warn!("no worker available for batch {seq}; dropped {len} records");
        TickOutcome::Dropped { seq, len }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
