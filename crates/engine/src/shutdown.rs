use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, info};

/// Teardown phases, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownPhase {
    Running = 0,
    StoppingIngress = 1,
    StoppingScheduler = 2,
    StoppingWorkers = 3,
    Closed = 4,
}

impl ShutdownPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::StoppingIngress,
            2 => ShutdownPhase::StoppingScheduler,
            3 => ShutdownPhase::StoppingWorkers,
            _ => ShutdownPhase::Closed,
        }
    }
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownPhase::Running => "running",
            ShutdownPhase::StoppingIngress => "stopping-ingress",
            ShutdownPhase::StoppingScheduler => "stopping-scheduler",
            ShutdownPhase::StoppingWorkers => "stopping-workers",
            ShutdownPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Shared view of the shutdown state machine.
///
/// Anyone may request shutdown; only the control loop advances past
/// `StoppingIngress`.
pub struct ShutdownCoordinator {
    phase: AtomicU8,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = channel::bounded(1);
        Self {
            phase: AtomicU8::new(ShutdownPhase::Running as u8),
            wake_tx,
            wake_rx,
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.phase() == ShutdownPhase::Running
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == ShutdownPhase::Closed
    }

    /// Move `Running -> StoppingIngress` and wake the control loop.
    ///
    /// Returns `false` when shutdown was already under way.
    pub fn request_shutdown(&self, reason: &str) -> bool {
        let started = self
            .phase
            .compare_exchange(
                ShutdownPhase::Running as u8,
                ShutdownPhase::StoppingIngress as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if started {
            info!("shutdown requested ({reason}); ingress now rejecting");
            // A full channel already holds a wake-up.
            let _ = self.wake_tx.try_send(());
        } else {
            debug!("shutdown already in progress; ignoring request ({reason})");
        }
        started
    }

    /// Move forward to `to`. Going backwards is ignored.
    pub(crate) fn advance(&self, to: ShutdownPhase) {
        let prev = ShutdownPhase::from_u8(self.phase.fetch_max(to as u8, Ordering::AcqRel));
        if prev < to {
            info!("shutdown phase: {prev} -> {to}");
        }
    }

    pub(crate) fn wake_signal(&self) -> &Receiver<()> {
        &self.wake_rx
    }
}
