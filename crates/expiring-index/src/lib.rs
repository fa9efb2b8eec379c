//! Time-ordered recency index
//!
//! Tracks when each name was last touched and evicts everything touched
//! before a threshold. Entries are kept in an ordered set keyed by
//! (time, name), so upserts and range expiration are O(log n) per entry.
//! The index says nothing about whether the underlying data still exists.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Entries {
    by_time: BTreeSet<(DateTime<Utc>, String)>,
    by_name: HashMap<String, DateTime<Utc>>,
}

impl Entries {
    fn upsert(&mut self, name: &str, at: DateTime<Utc>) {
        if let Some(previous) = self.by_name.insert(name.to_string(), at) {
            self.by_time.remove(&(previous, name.to_string()));
        }
        self.by_time.insert((at, name.to_string()));
    }

    fn remove(&mut self, name: &str) -> bool {
        match self.by_name.remove(name) {
            Some(at) => {
                self.by_time.remove(&(at, name.to_string()));
                true
            }
            None => false,
        }
    }
}

/// Recency index guarded by a single lock, held only for one touch or one
/// expiration pass
#[derive(Debug, Default)]
pub struct ExpiringIndex {
    entries: Mutex<Entries>,
}

impl ExpiringIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` as touched now
    pub async fn touch(&self, name: &str) {
        self.touch_at(name, Utc::now()).await;
    }

    /// Record `name` as touched at `at`, replacing any earlier time
    pub async fn touch_at(&self, name: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        entries.upsert(name, at);
    }

    /// Remove and return every name last touched strictly before
    /// `threshold`, oldest first
    pub async fn expire_before(&self, threshold: DateTime<Utc>) -> Vec<String> {
        let mut entries = self.entries.lock().await;

        let mut expired = Vec::new();
        while let Some((at, _)) = entries.by_time.first() {
            if *at >= threshold {
                break;
            }
            if let Some((_, name)) = entries.by_time.pop_first() {
                entries.by_name.remove(&name);
                expired.push(name);
            }
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), threshold = %threshold, "Expired index entries");
        }
        expired
    }

    /// Drop `name` from the index. Returns whether it was present.
    pub async fn remove(&self, name: &str) -> bool {
        self.entries.lock().await.remove(name)
    }

    pub async fn last_touched(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().await.by_name.get(name).copied()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
