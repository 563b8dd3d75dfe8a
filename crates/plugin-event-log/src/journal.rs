//! Bounded in-memory event journal.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 1000;

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    /// Entry id.
    pub id: Uuid,
    /// Hook the event arrived on.
    pub hook: String,
    /// Event payload.
    pub data: Value,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Journal keeping the most recent `capacity` entries.
#[derive(Debug)]
pub struct EventJournal {
    entries: Mutex<VecDeque<JournalEntry>>,
    capacity: usize,
}

impl EventJournal {
    /// Creates a journal holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    /// Appends an entry, evicting the oldest one when full.
    pub async fn record(&self, hook: &str, data: Value) -> JournalEntry {
        let entry = JournalEntry {
            id: Uuid::new_v4(),
            hook: hook.to_string(),
            data,
            recorded_at: Utc::now(),
        };

        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    /// Entries, oldest first.
    pub async fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the journal is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drops every entry; returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let removed = entries.len();
        entries.clear();
        removed
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
