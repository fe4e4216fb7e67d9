//! Sinks and helpers shared by the engine's unit tests.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow, bail};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use sluice_protocol::Record;

use crate::config::{PipelineConfig, SaturationPolicy};
use crate::pipeline::Controller;
use crate::pool::WorkerStatus;
use crate::progress::{ProgressCounters, ProgressTracker};
use crate::queue::IntakeQueue;
use crate::shutdown::ShutdownCoordinator;
use crate::sink::{MemorySink, Sink, SinkConnector};
use crate::worker::WorkerEvent;

pub fn records(prefix: &str, n: usize) -> Vec<Record> {
    (0..n).map(|i| Record::new(format!("{prefix}-{i}"))).collect()
}

pub fn test_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        queue_capacity: 1_000,
        max_batch_size: 100,
        batch_period: Duration::from_millis(10),
        worker_count: workers,
        max_requests: None,
        dispatch_timeout: Duration::from_secs(10),
        shutdown_grace: Duration::from_secs(2),
        startup_timeout: Duration::from_secs(5),
        respawn_workers: false,
        saturation: SaturationPolicy::Hold,
    }
}

/// Every write fails.
pub struct FailingSink;

impl SinkConnector for FailingSink {
    fn connect(&self) -> Result<Box<dyn Sink>> {
        Ok(Box::new(FailingSink))
    }

    fn describe(&self) -> String {
        "failing".into()
    }
}

impl Sink for FailingSink {
    fn bulk_write(&mut self, _records: &[Record]) -> Result<usize> {
        Err(anyhow!("disk on fire"))
    }
}

/// Cannot be connected to at all.
pub struct RefusingSink;

impl SinkConnector for RefusingSink {
    fn connect(&self) -> Result<Box<dyn Sink>> {
        bail!("connection refused")
    }

    fn describe(&self) -> String {
        "refusing".into()
    }
}

/// Panics on any batch containing `marker`, otherwise writes to `inner`.
pub struct PanickingSink {
    pub inner: MemorySink,
    pub marker: String,
}

struct PanickingConn {
    inner: Box<dyn Sink>,
    marker: String,
}

impl SinkConnector for PanickingSink {
    fn connect(&self) -> Result<Box<dyn Sink>> {
        Ok(Box::new(PanickingConn {
            inner: self.inner.connect()?,
            marker: self.marker.clone(),
        }))
    }

    fn describe(&self) -> String {
        "panicking".into()
    }
}

impl Sink for PanickingConn {
    fn bulk_write(&mut self, records: &[Record]) -> Result<usize> {
        if records.iter().any(|r| r.payload == self.marker) {
            panic!("sink hit marker record");
        }
        self.inner.bulk_write(records)
    }
}

/// Each write waits for a token on `gate` (or for the gate to close).
pub struct GatedSink {
    pub inner: MemorySink,
    pub gate: Receiver<()>,
}

struct GatedConn {
    inner: Box<dyn Sink>,
    gate: Receiver<()>,
}

impl SinkConnector for GatedSink {
    fn connect(&self) -> Result<Box<dyn Sink>> {
        Ok(Box::new(GatedConn {
            inner: self.inner.connect()?,
            gate: self.gate.clone(),
        }))
    }

    fn describe(&self) -> String {
        "gated".into()
    }
}

impl Sink for GatedConn {
    fn bulk_write(&mut self, records: &[Record]) -> Result<usize> {
        let _ = self.gate.recv();
        self.inner.bulk_write(records)
    }
}

/// A controller wired to fresh queue/progress/shutdown state.
pub struct Harness {
    pub controller: Controller,
    pub queue: Arc<IntakeQueue>,
    pub progress: Arc<ProgressTracker>,
    pub shutdown: Arc<ShutdownCoordinator>,
    events: Receiver<WorkerEvent>,
}

impl Harness {
    pub fn new(config: PipelineConfig, connector: Arc<dyn SinkConnector>) -> Self {
        let queue = Arc::new(IntakeQueue::new(config.queue_capacity));
        let progress = Arc::new(ProgressTracker::new(config.max_requests));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let controller = Controller::new(
            config,
            connector,
            Arc::clone(&queue),
            Arc::clone(&progress),
            Arc::clone(&shutdown),
        )
        .expect("controller starts");
        let events = controller.events_for_test();

        Self {
            controller,
            queue,
            progress,
            shutdown,
            events,
        }
    }

    pub fn enqueue_all(&self, records: Vec<Record>) {
        for r in records {
            self.queue.enqueue(r);
        }
    }

    /// Feed worker events to the controller until `done` holds or `timeout` passes.
    pub fn pump_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&Controller, ProgressCounters) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.controller, self.progress.snapshot()) {
                return true;
            }
            match self.events.recv_deadline(deadline) {
                Ok(event) => self.controller.handle_event(event),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return done(&self.controller, self.progress.snapshot());
                }
            }
        }
    }

    pub fn wait_until_ready(&mut self) {
        let ok = self.pump_until(Duration::from_secs(5), |c, _| {
            let pool = c.pool();
            pool.count_with(WorkerStatus::Ready) == pool.workers().len()
        });
        assert!(ok, "workers did not become ready in time");
    }

    pub fn wait_for_total(&mut self, total: u64) -> ProgressCounters {
        let ok = self.pump_until(Duration::from_secs(5), |_, p| p.total() >= total);
        assert!(ok, "expected {total} accounted records, got {:?}", self.progress.snapshot());
        self.progress.snapshot()
    }

    pub fn finish(self) -> ProgressCounters {
        self.controller.finish()
    }
}
