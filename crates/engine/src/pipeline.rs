use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, select};
use log::{error, info, warn};
use sluice_protocol::ServerStats;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::dispatch::{DispatchPolicy, RoundRobin};
use crate::gateway::IngressGateway;
use crate::pool::WorkerPool;
use crate::progress::{ProgressCounters, ProgressTracker};
use crate::queue::IntakeQueue;
use crate::scheduler::{BatchScheduler, TickOutcome};
use crate::shutdown::{ShutdownCoordinator, ShutdownPhase};
use crate::sink::SinkConnector;
use crate::worker::WorkerEvent;

/// Control-plane state. Lives on exactly one thread: the pool, the dispatch
/// policy and the scheduler are never touched from anywhere else.
pub(crate) struct Controller {
    config: PipelineConfig,
    queue: Arc<IntakeQueue>,
    progress: Arc<ProgressTracker>,
    shutdown: Arc<ShutdownCoordinator>,
    pool: WorkerPool,
    policy: Box<dyn DispatchPolicy>,
    scheduler: BatchScheduler,
    events: Receiver<WorkerEvent>,
}

impl Controller {
    pub(crate) fn new(
        config: PipelineConfig,
        connector: Arc<dyn SinkConnector>,
        queue: Arc<IntakeQueue>,
        progress: Arc<ProgressTracker>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Result<Self> {
        let (events_tx, events) = channel::unbounded();
        let pool = WorkerPool::start(
            config.worker_count,
            connector,
            events_tx,
            config.respawn_workers,
        )?;

        Ok(Self {
            scheduler: BatchScheduler::new(config.max_batch_size, config.saturation),
            config,
            queue,
            progress,
            shutdown,
            pool,
            policy: Box::new(RoundRobin::new()),
            events,
        })
    }

    pub(crate) fn tick(&mut self) -> TickOutcome {
        let outcome = self.scheduler.on_tick(
            &self.queue,
            &mut self.pool,
            self.policy.as_mut(),
            &self.progress,
        );
        self.pool
            .expire_overdue(self.config.dispatch_timeout, &self.progress);
        outcome
    }

    pub(crate) fn handle_event(&mut self, event: WorkerEvent) {
        self.pool.on_event(event, &self.progress);
    }

    /// Block until at least one worker has connected its sink. Gives up early
    /// once every worker has exited.
    pub(crate) fn await_ready(&mut self, timeout: Duration) -> Result<(), PipelineError> {
        let deadline = Instant::now() + timeout;
        while !self.pool.has_ready() {
            if self.pool.live_count() == 0 {
                break;
            }
            match self.events.recv_deadline(deadline) {
                Ok(event) => self.handle_event(event),
                Err(_) => break,
            }
        }

        if self.pool.has_ready() {
            Ok(())
        } else {
            Err(PipelineError::StartupFailure {
                workers: self.pool.workers().len(),
                timeout,
            })
        }
    }

    fn run(mut self) -> ProgressCounters {
        let ticker = channel::tick(self.config.batch_period);
        let events = self.events.clone();
        let wake = self.shutdown.wake_signal().clone();

        while self.shutdown.is_running() {
            select! {
                recv(ticker) -> _ => {
                    self.tick();
                }
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
                recv(wake) -> _ => {}
            }

            if self.progress.threshold_reached() {
                self.shutdown.request_shutdown("max_requests reached");
            }
        }

        drop(ticker);
        self.finish()
    }

    /// Worker teardown and final accounting.
    pub(crate) fn finish(mut self) -> ProgressCounters {
        self.shutdown.advance(ShutdownPhase::StoppingScheduler);

        let abandoned = self.queue.len();
        if abandoned > 0 {
            warn!("{abandoned} queued records were never drained");
        }

        self.shutdown.advance(ShutdownPhase::StoppingWorkers);
        self.pool.terminate_all(
            self.config.shutdown_grace,
            &self.events,
            &self.progress,
        );

        let counters = self.progress.snapshot();
        info!(
            "pipeline closed: {} batches drained, {} records drained, {} processed, {} failed",
            self.scheduler.batches_drained(),
            self.queue.counters().drained,
            counters.total_processed,
            counters.total_failed
        );
        self.shutdown.advance(ShutdownPhase::Closed);
        counters
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }

    #[cfg(test)]
    pub(crate) fn events_for_test(&self) -> Receiver<WorkerEvent> {
        self.events.clone()
    }
}

/// The running ingestion pipeline: gateway in front, control loop and worker
/// pool behind.
pub struct Pipeline {
    gateway: IngressGateway,
    queue: Arc<IntakeQueue>,
    progress: Arc<ProgressTracker>,
    shutdown: Arc<ShutdownCoordinator>,
    control: Mutex<Option<JoinHandle<ProgressCounters>>>,
}

impl Pipeline {
    pub fn start(config: PipelineConfig, connector: Arc<dyn SinkConnector>) -> Result<Self> {
        config.validate()?;

        info!(
            "starting pipeline: capacity={}, batch={}, period={:?}, workers={}, max_requests={:?}",
            config.queue_capacity,
            config.max_batch_size,
            config.batch_period,
            config.worker_count,
            config.max_requests
        );

        let startup_timeout = config.startup_timeout;
        let queue = Arc::new(IntakeQueue::new(config.queue_capacity));
        let progress = Arc::new(ProgressTracker::new(config.max_requests));
        let shutdown = Arc::new(ShutdownCoordinator::new());

        let mut controller = Controller::new(
            config,
            connector,
            Arc::clone(&queue),
            Arc::clone(&progress),
            Arc::clone(&shutdown),
        )?;
        if let Err(e) = controller.await_ready(startup_timeout) {
            controller.finish();
            return Err(e.into());
        }

        let control = thread::Builder::new()
            .name("sluice-control".into())
            .spawn(move || controller.run())
            .context("Failed to spawn control loop thread")?;

        Ok(Self {
            gateway: IngressGateway::new(Arc::clone(&queue), Arc::clone(&shutdown)),
            queue,
            progress,
            shutdown,
            control: Mutex::new(Some(control)),
        })
    }

    pub fn gateway(&self) -> &IngressGateway {
        &self.gateway
    }

    pub fn queue(&self) -> &IntakeQueue {
        &self.queue
    }

    pub fn progress(&self) -> ProgressCounters {
        self.progress.snapshot()
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.shutdown.phase()
    }

    pub fn stats(&self) -> ServerStats {
        let counters = self.progress.snapshot();
        ServerStats {
            phase: self.phase().to_string(),
            queue_len: self.queue.len() as u64,
            queue_capacity: self.queue.capacity() as u64,
            total_processed: counters.total_processed,
            total_failed: counters.total_failed,
        }
    }

    pub fn request_shutdown(&self, reason: &str) -> bool {
        self.shutdown.request_shutdown(reason)
    }

    /// Block until the pipeline reaches `Closed`.
    pub fn wait(&self) -> ProgressCounters {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = control.take()
            && handle.join().is_err()
        {
            error!("control loop panicked; forcing closed state");
            self.shutdown.advance(ShutdownPhase::Closed);
        }
        self.progress.snapshot()
    }

    /// Request shutdown and wait for it. Calling this again is harmless.
    pub fn shutdown(&self) -> ProgressCounters {
        self.request_shutdown("shutdown requested");
        self.wait()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.shutdown.is_closed() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
