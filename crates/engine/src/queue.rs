use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sluice_protocol::Record;

/// Outcome of [`IntakeQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Queue at capacity; nothing was mutated.
    Rejected,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounters {
    pub accepted: u64,
    pub rejected: u64,
    /// Records that have left the queue through `drain`.
    pub drained: u64,
}

struct Inner {
    records: VecDeque<Record>,
    counters: QueueCounters,
}

/// Bounded FIFO between ingress and the batch scheduler.
///
/// A single mutex covers the enqueue/drain pair. Capacity is checked only on
/// enqueue, and neither side ever waits for space or for data.
pub struct IntakeQueue {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl IntakeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                // Don't preallocate the full capacity: defaults are large.
                records: VecDeque::with_capacity(capacity.min(4096)),
                counters: QueueCounters::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, record: Record) -> Admission {
        let mut inner = self.lock();
        if inner.records.len() >= self.capacity {
            inner.counters.rejected += 1;
            return Admission::Rejected;
        }
        inner.records.push_back(record);
        inner.counters.accepted += 1;
        Admission::Accepted
    }

    /// Remove up to `max` records from the head, oldest first.
    pub fn drain(&self, max: usize) -> Vec<Record> {
        let mut inner = self.lock();
        let n = max.min(inner.records.len());
        let out: Vec<Record> = inner.records.drain(..n).collect();
        inner.counters.drained += out.len() as u64;
        out
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counters(&self) -> QueueCounters {
        self.lock().counters
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
