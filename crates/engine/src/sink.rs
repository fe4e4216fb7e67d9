use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hashbrown::HashSet;
use log::debug;
use serde::{Deserialize, Serialize};
use sluice_protocol::Record;

/// One worker's connection to the persistent store.
pub trait Sink: Send {
    /// Persist `records` in order and return how many were written.
    ///
    /// Implementations may skip duplicates silently, so the count can be
    /// lower than `records.len()`.
    fn bulk_write(&mut self, records: &[Record]) -> Result<usize>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens sink connections. Every worker calls `connect` once on start-up and
/// owns the result exclusively.
pub trait SinkConnector: Send + Sync + 'static {
    fn connect(&self) -> Result<Box<dyn Sink>>;

    fn describe(&self) -> String;
}

/// Row layout of the file sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub written_at: DateTime<Utc>,
}

/// Append-only JSON-lines file shared by all workers.
#[derive(Debug)]
pub struct FileSinkConnector {
    path: PathBuf,
}

impl FileSinkConnector {
    /// Create the parent directory and open the file once, so an unwritable
    /// path fails at start-up rather than inside every worker.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create sink directory {}", parent.display())
            })?;
        }
        open_append(&path)?;
        Ok(Self { path })
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open sink file {}", path.display()))
}

impl SinkConnector for FileSinkConnector {
    fn connect(&self) -> Result<Box<dyn Sink>> {
        let file = open_append(&self.path)?;
        Ok(Box::new(FileSink { file }))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

pub struct FileSink {
    file: File,
}

impl Sink for FileSink {
    fn bulk_write(&mut self, records: &[Record]) -> Result<usize> {
        let written_at = Utc::now();
        let mut buf = Vec::with_capacity(records.len() * 96);

        for r in records {
            let row = StoredRecord {
                payload: r.payload.clone(),
                received_at: r.received_at,
                written_at,
            };
            serde_json::to_writer(&mut buf, &row)?;
            buf.push(b'\n');
        }

        // One write per batch keeps lines from different workers from
        // interleaving under O_APPEND.
        self.file
            .write_all(&buf)
            .context("Failed to append batch to sink file")?;
        Ok(records.len())
    }

    fn close(&mut self) -> Result<()> {
        self.file.sync_data().context("Failed to sync sink file")
    }
}

/// Read every row of a file sink back, skipping malformed lines.
pub fn read_file_sink(path: &Path) -> Result<Vec<StoredRecord>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read sink file {}", path.display()))?;

    Ok(contents
        .lines()
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!("Skipping malformed sink line: {e}");
                None
            }
        })
        .collect())
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<Record>,
    seen: HashSet<(String, DateTime<Utc>)>,
}

#[derive(Default)]
struct MemoryStore {
    state: Mutex<MemoryState>,
    connections: AtomicUsize,
    skip_duplicates: bool,
}

/// In-process store. Cloning shares the same rows.
#[derive(Clone, Default)]
pub struct MemorySink {
    store: Arc<MemoryStore>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop records whose (payload, received_at) pair was already stored.
    pub fn skipping_duplicates() -> Self {
        Self {
            store: Arc::new(MemoryStore {
                skip_duplicates: true,
                ..MemoryStore::default()
            }),
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.store
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .clone()
    }

    pub fn len(&self) -> usize {
        self.store
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of connections opened so far.
    pub fn connections(&self) -> usize {
        self.store.connections.load(Ordering::Acquire)
    }
}

impl SinkConnector for MemorySink {
    fn connect(&self) -> Result<Box<dyn Sink>> {
        self.store.connections.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryConnection {
            store: Arc::clone(&self.store),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryConnection {
    store: Arc<MemoryStore>,
}

impl Sink for MemoryConnection {
    fn bulk_write(&mut self, records: &[Record]) -> Result<usize> {
        let mut state = self
            .store
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut written = 0;
        for r in records {
            if self.store.skip_duplicates
                && !state.seen.insert((r.payload.clone(), r.received_at))
            {
                continue;
            }
            state.rows.push(r.clone());
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
