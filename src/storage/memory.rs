//! In-memory store backed by a sharded map.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{Counters, Payload, StorageAdapter, StorageStats};
use crate::error::{Error, Result};

/// Sharded in-memory object store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: DashMap<String, Payload>,
    counters: Counters,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set(&self, key: &str, value: Payload) -> Result<()> {
        let size = value.len();
        let old = self.objects.insert(key.to_string(), value);
        self.counters.write(size, old.map(|p| p.len()));
        trace!("Stored {} ({} bytes)", key, size);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Payload> {
        self.counters.read();
        match self.objects.get(key) {
            Some(payload) => Ok(payload.clone()),
            None => {
                self.counters.miss();
                Err(Error::NotFound {
                    key: key.to_string(),
                })
            }
        }
    }

    fn stats(&self) -> StorageStats {
        self.counters.snapshot()
    }
}
