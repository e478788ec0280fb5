//! Event persistence collaborators
//!
//! The core only needs two operations from persistence: append one event
//! string for a candidate, and fetch the candidate's ordered log. Two
//! implementations are provided: an in-memory store and an append-only
//! NDJSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::ProctorError;
use crate::types::LogEntry;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event string for a candidate
    async fn append(&self, candidate_name: &str, event: &str) -> Result<(), ProctorError>;

    /// The candidate's persisted events, in store order
    async fn fetch_log(&self, candidate_name: &str) -> Result<Vec<LogEntry>, ProctorError>;
}

/// Process-local store keyed by candidate
pub struct InMemoryEventStore {
    clock: Arc<dyn Clock>,
    logs: Mutex<HashMap<String, Vec<LogEntry>>>,
    reject_appends: AtomicBool,
    reject_reads: AtomicBool,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryEventStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            logs: Mutex::new(HashMap::new()),
            reject_appends: AtomicBool::new(false),
            reject_reads: AtomicBool::new(false),
        }
    }

    /// Make subsequent appends fail, simulating an unreachable backend
    pub fn set_reject_appends(&self, reject: bool) {
        self.reject_appends.store(reject, Ordering::SeqCst);
    }

    /// Make subsequent reads fail
    pub fn set_reject_reads(&self, reject: bool) {
        self.reject_reads.store(reject, Ordering::SeqCst);
    }

    /// Insert a pre-built entry, bypassing the clock
    pub fn insert(&self, candidate_name: &str, entry: LogEntry) {
        self.logs
            .lock()
            .entry(candidate_name.to_string())
            .or_default()
            .push(entry);
    }

    pub fn len(&self, candidate_name: &str) -> usize {
        self.logs.lock().get(candidate_name).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, candidate_name: &str, event: &str) -> Result<(), ProctorError> {
        if self.reject_appends.load(Ordering::SeqCst) {
            return Err(ProctorError::Store("append rejected".to_string()));
        }

        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: self.clock.now(),
            event: event.to_string(),
        };
        self.insert(candidate_name, entry);
        Ok(())
    }

    async fn fetch_log(&self, candidate_name: &str) -> Result<Vec<LogEntry>, ProctorError> {
        if self.reject_reads.load(Ordering::SeqCst) {
            return Err(ProctorError::Store("read rejected".to_string()));
        }

        Ok(self.logs.lock().get(candidate_name).cloned().unwrap_or_default())
    }
}

/// One line of the NDJSON event file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub candidate_name: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredEvent> for LogEntry {
    fn from(stored: StoredEvent) -> Self {
        LogEntry {
            id: stored.id,
            timestamp: stored.timestamp,
            event: stored.event,
        }
    }
}

/// Append-only newline-delimited JSON file shared by all candidates
pub struct JsonlEventStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStore for JsonlEventStore {
    async fn append(&self, candidate_name: &str, event: &str) -> Result<(), ProctorError> {
        let record = StoredEvent {
            id: Uuid::new_v4().to_string(),
            candidate_name: candidate_name.to_string(),
            event: event.to_string(),
            timestamp: self.clock.now(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn fetch_log(&self, candidate_name: &str) -> Result<Vec<LogEntry>, ProctorError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut log = Vec::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let stored: StoredEvent = serde_json::from_str(trimmed)?;
            if stored.candidate_name == candidate_name {
                log.push(stored.into());
            }
        }
        Ok(log)
    }
}
