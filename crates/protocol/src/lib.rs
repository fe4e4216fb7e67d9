pub mod codec;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of inbound write data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub payload: String,
    /// Time the ingress gateway accepted the call.
    pub received_at: DateTime<Utc>,
}

impl Record {
    pub fn new(payload: String) -> Self {
        Self {
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Ordered group of records drained from the head of the intake queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Monotonic sequence number assigned by the scheduler.
    pub seq: u64,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestStatus {
    /// Record queued (not yet durable).
    Ok,
    /// Queue full or server shutting down.
    Rejected,
}

impl IngestStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, IngestStatus::Ok)
    }
}

/// Final acknowledgement of a streaming call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAck {
    pub accepted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub phase: String,
    pub queue_len: u64,
    pub queue_capacity: u64,
    pub total_processed: u64,
    pub total_failed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum IngestRequest {
    Process { payload: String },
    StreamItem { payload: String },
    StreamEnd,
    Stats,
    Ping,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum IngestResponse {
    Status(IngestStatus),
    StreamAck(StreamAck),
    Stats(ServerStats),
    Pong,
    Error(String),
}

/// Controller -> worker.
#[derive(Debug, Serialize, Deserialize)]
pub enum ControlMessage {
    Batch(Batch),
    Terminate,
}

/// Worker -> controller. Exactly one `Processed` or `Failed` per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerMessage {
    Ready,
    Processed {
        batch: u64,
        /// Records handled, including duplicates the sink skipped.
        count: u64,
        /// Records the sink actually wrote.
        written: u64,
    },
    Failed {
        batch: u64,
        reason: String,
    },
}
