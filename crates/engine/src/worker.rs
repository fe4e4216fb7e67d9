use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, warn};
use sluice_protocol::{ControlMessage, WorkerMessage};

use crate::sink::SinkConnector;

/// Slot index of a worker inside the pool.
pub type WorkerId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEventKind {
    Message(WorkerMessage),
    /// Sent by the exit guard on every way out of the worker thread.
    Exited { panicked: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub worker: WorkerId,
    pub generation: u32,
    pub kind: WorkerEventKind,
}

/// Reports the worker's exit when dropped, panic or not.
struct ExitGuard {
    worker: WorkerId,
    generation: u32,
    events: Sender<WorkerEvent>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let panicked = thread::panicking();
        if panicked {
            error!("worker {} panicked", self.worker);
        }
        let _ = self.events.send(WorkerEvent {
            worker: self.worker,
            generation: self.generation,
            kind: WorkerEventKind::Exited { panicked },
        });
    }
}

/// Control-side end of a running worker.
pub(crate) struct SpawnedWorker {
    pub commands: Sender<ControlMessage>,
    pub thread: JoinHandle<()>,
}

pub(crate) fn spawn_worker(
    worker: WorkerId,
    generation: u32,
    connector: Arc<dyn SinkConnector>,
    events: Sender<WorkerEvent>,
) -> Result<SpawnedWorker> {
    let (commands, inbox) = channel::unbounded::<ControlMessage>();

    let thread = thread::Builder::new()
        .name(format!("sluice-worker-{worker}"))
        .spawn(move || {
            let _guard = ExitGuard {
                worker,
                generation,
                events: events.clone(),
            };
            run_worker(worker, generation, connector.as_ref(), inbox, events);
        })
        .with_context(|| format!("Failed to spawn worker thread {worker}"))?;

    Ok(SpawnedWorker { commands, thread })
}

fn run_worker(
    worker: WorkerId,
    generation: u32,
    connector: &dyn SinkConnector,
    inbox: Receiver<ControlMessage>,
    events: Sender<WorkerEvent>,
) {
    let send = |msg: WorkerMessage| {
        events
            .send(WorkerEvent {
                worker,
                generation,
                kind: WorkerEventKind::Message(msg),
            })
            .is_ok()
    };

    let mut sink = match connector.connect() {
        Ok(sink) => sink,
        Err(e) => {
            error!("worker {worker}: cannot connect to sink: {e:#}");
            return;
        }
    };

    if !send(WorkerMessage::Ready) {
        return;
    }
    debug!("worker {worker} (gen {generation}) ready");

    while let Ok(msg) = inbox.recv() {
        match msg {
            ControlMessage::Batch(batch) => {
                let count = batch.len() as u64;
                let reply = match sink.bulk_write(&batch.records) {
                    Ok(written) => WorkerMessage::Processed {
                        batch: batch.seq,
                        count,
                        written: written as u64,
                    },
                    Err(e) => WorkerMessage::Failed {
                        batch: batch.seq,
                        reason: format!("{e:#}"),
                    },
                };
                if !send(reply) {
                    break;
                }
            }
            ControlMessage::Terminate => {
                debug!("worker {worker} received terminate");
                break;
            }
        }
    }

    if let Err(e) = sink.close() {
        warn!("worker {worker}: error closing sink: {e:#}");
    }
}
