//! Operation History.
//!
//! A capped, append-only log of executed batches. When full, the oldest entry is evicted. Only
//! the batch executor appends; everything else reads.
//!
//! Persisted as a JSON array of [`HistoryEntry`], oldest first.

use crate::batch::OperationType;
use crate::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use clinsync_types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use uuid::Uuid;

/// Summary of one executed batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub operation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation_type: OperationType,
    pub resource_kind: ResourceKind,
    pub total_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub duration_ms: u64,
    pub actor: String,
}

/// Ring buffer of the most recent [`HistoryEntry`] values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl OperationHistory {
    /// Create an empty history. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuild a history from entries ordered oldest first, keeping the newest `capacity`.
    pub fn from_entries(capacity: usize, entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut history = Self::new(capacity);
        for entry in entries {
            history.record(entry);
        }
        history
    }

    /// Append an entry, returning the evicted oldest entry when the buffer was full.
    pub(crate) fn record(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn to_json_string(&self) -> SyncResult<String> {
        serde_json::to_string_pretty(&self.entries).map_err(SyncError::Serialization)
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Deserialization`] if `json_text` is not an array of entries.
    pub fn from_json_str(capacity: usize, json_text: &str) -> SyncResult<Self> {
        let entries: Vec<HistoryEntry> =
            serde_json::from_str(json_text).map_err(SyncError::Deserialization)?;
        Ok(Self::from_entries(capacity, entries))
    }

    /// Load a history file. A missing file yields an empty history.
    pub fn load(path: &Path, capacity: usize) -> SyncResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json_str(capacity, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(capacity)),
            Err(e) => Err(SyncError::FileRead(e)),
        }
    }

    pub fn save(&self, path: &Path) -> SyncResult<()> {
        std::fs::write(path, self.to_json_string()?).map_err(SyncError::FileWrite)
    }
}
