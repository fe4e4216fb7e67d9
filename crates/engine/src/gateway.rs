use std::sync::Arc;

use log::{debug, trace};
use sluice_protocol::{IngestStatus, Record, StreamAck};

use crate::queue::{Admission, IntakeQueue};
use crate::shutdown::ShutdownCoordinator;

/// Turns inbound calls into queued records.
///
/// Acceptance means "queued", never "durable": nothing here waits on a worker.
#[derive(Clone)]
pub struct IngressGateway {
    queue: Arc<IntakeQueue>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl IngressGateway {
    pub fn new(queue: Arc<IntakeQueue>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self { queue, shutdown }
    }

    pub fn process(&self, payload: String) -> IngestStatus {
        if !self.shutdown.is_running() {
            trace!("rejecting call: shutdown in progress");
            return IngestStatus::Rejected;
        }

        match self.queue.enqueue(Record::new(payload)) {
            Admission::Accepted => IngestStatus::Ok,
            Admission::Rejected => {
                debug!(
                    "intake queue full ({} records); dropping incoming request",
                    self.queue.capacity()
                );
                IngestStatus::Rejected
            }
        }
    }

    /// Open a streaming call session.
    pub fn stream(&self) -> StreamSession<'_> {
        StreamSession {
            gateway: self,
            ack: StreamAck::default(),
        }
    }
}

/// One client stream. Each element is admitted on arrival under the same rule
/// as a unary call.
pub struct StreamSession<'a> {
    gateway: &'a IngressGateway,
    ack: StreamAck,
}

impl StreamSession<'_> {
    pub fn push(&mut self, payload: String) -> IngestStatus {
        let status = self.gateway.process(payload);
        match status {
            IngestStatus::Ok => self.ack.accepted += 1,
            IngestStatus::Rejected => self.ack.rejected += 1,
        }
        status
    }

    /// End of stream; the returned ack is the call's final reply.
    pub fn finish(self) -> StreamAck {
        self.ack
    }
}
