use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use anyhow::Result;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use sluice_protocol::{Batch, ControlMessage, WorkerMessage};

use crate::error::PipelineError;
use crate::progress::ProgressTracker;
use crate::sink::SinkConnector;
use crate::worker::{WorkerEvent, WorkerEventKind, WorkerId, spawn_worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Spawned, `Ready` handshake not seen yet.
    Starting,
    /// Idle and eligible for dispatch.
    Ready,
    /// Holding one unacknowledged batch.
    Busy,
    Terminated,
}

#[derive(Debug, Clone)]
struct InFlight {
    seq: u64,
    len: usize,
    dispatched_at: Instant,
    /// Already written off as failed by the dispatch timeout.
    expired: bool,
}

/// The pool's view of one worker. Never leaves the control loop.
pub struct WorkerHandle {
    id: WorkerId,
    generation: u32,
    status: WorkerStatus,
    commands: Option<Sender<ControlMessage>>,
    thread: Option<JoinHandle<()>>,
    in_flight: Option<InFlight>,
    terminate_sent: bool,
    was_ready: bool,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Handle with no thread behind it, for exercising dispatch policies.
    #[cfg(test)]
    pub(crate) fn detached(id: WorkerId, status: WorkerStatus) -> Self {
        Self {
            id,
            generation: 0,
            status,
            commands: None,
            thread: None,
            in_flight: None,
            terminate_sent: false,
            was_ready: status != WorkerStatus::Starting,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_status(&mut self, status: WorkerStatus) {
        self.status = status;
    }

    /// Write off the in-flight batch, if it has not been already.
    fn write_off_in_flight(&mut self, progress: &ProgressTracker) -> usize {
        match self.in_flight.take() {
            Some(f) if !f.expired => {
                progress.on_worker_report(f.len as u64, true);
                f.len
            }
            _ => 0,
        }
    }
}

/// Fixed set of sink workers, each reachable only through its command channel.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    connector: Arc<dyn SinkConnector>,
    events: Sender<WorkerEvent>,
    respawn: bool,
    draining: bool,
}

impl WorkerPool {
    pub fn start(
        count: usize,
        connector: Arc<dyn SinkConnector>,
        events: Sender<WorkerEvent>,
        respawn: bool,
    ) -> Result<Self> {
        info!(
            "starting {count} workers against sink {}",
            connector.describe()
        );

        let mut pool = Self {
            workers: Vec::with_capacity(count),
            connector,
            events,
            respawn,
            draining: false,
        };

        for id in 0..count {
            let spawned = spawn_worker(id, 0, Arc::clone(&pool.connector), pool.events.clone())?;
            pool.workers.push(WorkerHandle {
                id,
                generation: 0,
                status: WorkerStatus::Starting,
                commands: Some(spawned.commands),
                thread: Some(spawned.thread),
                in_flight: None,
                terminate_sent: false,
                was_ready: false,
            });
        }

        Ok(pool)
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Stop worker `id` and join it without handling its exit event, as if it
    /// died between two ticks.
    #[cfg(test)]
    pub(crate) fn stop_unobserved(&mut self, id: WorkerId) {
        let w = &mut self.workers[id];
        if let Some(commands) = w.commands.as_ref() {
            let _ = commands.send(ControlMessage::Terminate);
        }
        if let Some(t) = w.thread.take() {
            let _ = t.join();
        }
    }

    pub fn count_with(&self, status: WorkerStatus) -> usize {
        self.workers.iter().filter(|w| w.status == status).count()
    }

    pub fn has_ready(&self) -> bool {
        self.count_with(WorkerStatus::Ready) > 0
    }

    pub fn live_count(&self) -> usize {
        self.workers.len() - self.count_with(WorkerStatus::Terminated)
    }

    /// Hand `batch` to worker `id`. Returns `false` if the worker's channel is
    /// gone, in which case the batch has been dropped.
    pub fn dispatch(&mut self, id: WorkerId, batch: Batch) -> bool {
        let Some(w) = self.workers.get_mut(id) else {
            return false;
        };
        let Some(commands) = w.commands.as_ref() else {
            return false;
        };

        let seq = batch.seq;
        let len = batch.len();
        if commands.send(ControlMessage::Batch(batch)).is_err() {
            return false;
        }

        w.status = WorkerStatus::Busy;
        w.in_flight = Some(InFlight {
            seq,
            len,
            dispatched_at: Instant::now(),
            expired: false,
        });
        true
    }

    pub fn on_event(&mut self, event: WorkerEvent, progress: &ProgressTracker) {
        let Some(w) = self.workers.get_mut(event.worker) else {
            warn!("event from unknown worker {}", event.worker);
            return;
        };
        if w.generation != event.generation {
            debug!(
                "ignoring event from retired worker {} gen {}",
                event.worker, event.generation
            );
            return;
        }

        match event.kind {
            WorkerEventKind::Message(WorkerMessage::Ready) => {
                if w.status == WorkerStatus::Starting {
                    info!("worker {} is ready", w.id);
                    w.status = WorkerStatus::Ready;
                    w.was_ready = true;
                }
            }
            WorkerEventKind::Message(WorkerMessage::Processed {
                batch,
                count,
                written,
            }) => {
                if Self::settle(w, batch) {
                    progress.on_worker_report(count, false);
                    let total = progress.snapshot().total_processed;
                    info!(
                        "worker {} processed batch {batch}: {count} records ({written} written). Total processed: {total}",
                        w.id
                    );
                }
            }
            WorkerEventKind::Message(WorkerMessage::Failed { batch, reason }) => {
                let len = w.in_flight.as_ref().map_or(0, |f| f.len);
                if Self::settle(w, batch) {
                    progress.on_worker_report(len as u64, true);
                    error!(
                        "worker {}: {}",
                        w.id,
                        PipelineError::PersistenceFailure { batch, reason }
                    );
                }
            }
            WorkerEventKind::Exited { panicked } => {
                let lost = w.write_off_in_flight(progress);
                let expected = w.terminate_sent && !panicked;
                w.status = WorkerStatus::Terminated;
                w.commands = None;
                if let Some(t) = w.thread.take() {
                    // Panic already reported by the exit guard.
                    let _ = t.join();
                }

                if expected {
                    debug!("worker {} acknowledged terminate", w.id);
                    return;
                }
                error!(
                    "{}",
                    PipelineError::WorkerCrash {
                        worker: w.id,
                        lost
                    }
                );

                let id = w.id;
                let respawnable = w.was_ready;
                if self.respawn && !self.draining {
                    if respawnable {
                        self.respawn_slot(id);
                    } else {
                        warn!("worker {id} never became ready; not respawning");
                    }
                }
                if self.live_count() == 0 {
                    error!("no live workers remain; batches will be dropped");
                }
            }
        }
    }

    /// Clear the in-flight batch matching `seq`. Returns whether the reply
    /// should be counted.
    fn settle(w: &mut WorkerHandle, seq: u64) -> bool {
        let counted = match w.in_flight.take() {
            Some(f) if f.seq == seq && !f.expired => true,
            Some(f) if f.seq == seq => {
                info!(
                    "late reply for batch {seq} from worker {} ignored (already timed out)",
                    w.id
                );
                false
            }
            other => {
                warn!(
                    "worker {} replied for batch {seq} but had {:?} in flight",
                    w.id,
                    other.as_ref().map(|f| f.seq)
                );
                w.in_flight = other;
                return false;
            }
        };
        if w.status == WorkerStatus::Busy {
            w.status = WorkerStatus::Ready;
        }
        counted
    }

    fn respawn_slot(&mut self, id: WorkerId) {
        let generation = self.workers[id].generation + 1;
        match spawn_worker(id, generation, Arc::clone(&self.connector), self.events.clone()) {
            Ok(spawned) => {
                info!("respawned worker {id} (gen {generation})");
                let w = &mut self.workers[id];
                w.generation = generation;
                w.status = WorkerStatus::Starting;
                w.commands = Some(spawned.commands);
                w.thread = Some(spawned.thread);
                w.terminate_sent = false;
                w.was_ready = false;
            }
            Err(e) => error!("failed to respawn worker {id}: {e:#}"),
        }
    }

    /// Write off batches that have been in flight longer than `timeout`.
    /// The worker stays busy until it replies.
    pub fn expire_overdue(&mut self, timeout: Duration, progress: &ProgressTracker) {
        let now = Instant::now();
        for w in &mut self.workers {
            if let Some(f) = w.in_flight.as_mut()
                && !f.expired
                && now.duration_since(f.dispatched_at) >= timeout
            {
                f.expired = true;
                progress.on_worker_report(f.len as u64, true);
                warn!(
                    "batch {} on worker {} unacknowledged after {:?}; counted as failed",
                    f.seq, w.id, timeout
                );
            }
        }
    }

    /// Send `Terminate` to every live worker and wait up to `grace` for them to
    /// exit, accounting any replies that arrive meanwhile. Stragglers are
    /// detached and their in-flight batches written off.
    pub fn terminate_all(
        &mut self,
        grace: Duration,
        events: &Receiver<WorkerEvent>,
        progress: &ProgressTracker,
    ) {
        self.draining = true;

        for w in &mut self.workers {
            if w.status == WorkerStatus::Terminated {
                continue;
            }
            if let Some(commands) = w.commands.as_ref() {
                // A closed channel means the exit event is already queued.
                let _ = commands.send(ControlMessage::Terminate);
            }
            w.terminate_sent = true;
        }

        let deadline = Instant::now() + grace;
        while self.live_count() > 0 {
            match events.recv_deadline(deadline) {
                Ok(event) => self.on_event(event, progress),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for w in &mut self.workers {
            if w.status == WorkerStatus::Terminated {
                continue;
            }
            let lost = w.write_off_in_flight(progress);
            warn!(
                "{}; force-terminating ({lost} in-flight records written off)",
                PipelineError::ShutdownTimeout {
                    worker: w.id,
                    grace
                }
            );
            w.status = WorkerStatus::Terminated;
            // Closing the channel ends the worker once its sink call returns.
            w.commands = None;
            w.thread = None;
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
