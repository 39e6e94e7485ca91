//! Eviction Ledger
//!
//! Append-only log of chunks removed from nodes under memory pressure.
//! Re-evicting a key appends a new event; `lookup` returns the latest one.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::Chunk;

/// One eviction event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionRecord {
    /// Object key the chunk belonged to
    pub key: String,
    /// The evicted chunk
    pub chunk: Chunk,
}

/// Append-only eviction log with a per-key index
#[derive(Debug, Default)]
pub struct EvictionLedger {
    events: RwLock<Vec<EvictionRecord>>,
    /// Key -> position of its latest event
    latest: DashMap<String, usize>,
}

impl EvictionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an eviction event
    pub fn record(&self, key: &str, chunk: Chunk) {
        debug!("evicting {} ({})", key, chunk.key);
        let mut events = self.events.write();
        events.push(EvictionRecord {
            key: key.to_string(),
            chunk,
        });
        self.latest.insert(key.to_string(), events.len() - 1);
    }

    /// Latest chunk evicted for `key`
    pub fn lookup(&self, key: &str) -> Option<Chunk> {
        let position = *self.latest.get(key)?;
        self.events
            .read()
            .get(position)
            .map(|event| event.chunk.clone())
    }

    /// True if any chunk of `key` was ever evicted
    pub fn contains(&self, key: &str) -> bool {
        self.latest.contains_key(key)
    }

    /// Snapshot of all events in append order
    pub fn iter(&self) -> impl Iterator<Item = EvictionRecord> {
        self.events.read().clone().into_iter()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct keys with at least one event
    pub fn num_keys(&self) -> usize {
        self.latest.len()
    }
}
