//! Dummy Store
//!
//! Remembers object sizes only and sleeps for the transfer time a configured
//! bandwidth implies. In cache mode a fixed share of reads report not found,
//! modelling a lossy cache in front of the trace.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{transfer_time, Counters, Payload, StorageAdapter, StorageStats};
use crate::error::{Error, Result};

/// Percentage of cache-mode reads answered with not found
pub const DEFAULT_MISS_RATIO: u32 = 50;

/// Dummy store flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DummyKind {
    /// Reliable store
    #[default]
    Store,
    /// Cache that misses `miss_ratio` percent of reads
    Cache { miss_ratio: u32 },
}

impl DummyKind {
    /// Short name used in logs
    pub fn abbr(&self) -> &'static str {
        match self {
            DummyKind::Store => "ds",
            DummyKind::Cache { .. } => "dc",
        }
    }
}

/// Size-only store with simulated bandwidth
#[derive(Debug)]
pub struct DummyStore {
    kind: DummyKind,
    /// Bytes/second; 0 is unlimited
    bandwidth: u64,
    sizes: DashMap<String, usize>,
    counters: Counters,
}

impl DummyStore {
    pub fn new(bandwidth: u64, kind: DummyKind) -> Self {
        Self {
            kind,
            bandwidth,
            sizes: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn kind(&self) -> DummyKind {
        self.kind
    }

    fn delay(&self, size: usize) -> Duration {
        transfer_time(size, self.bandwidth)
    }

    async fn transfer(&self, size: usize) {
        let delay = self.delay(size);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn sampled_miss(&self) -> bool {
        match self.kind {
            DummyKind::Store => false,
            DummyKind::Cache { miss_ratio } => rand::thread_rng().gen_range(0..100) < miss_ratio,
        }
    }
}

#[async_trait]
impl StorageAdapter for DummyStore {
    fn name(&self) -> &str {
        self.kind.abbr()
    }

    async fn set(&self, key: &str, value: Payload) -> Result<()> {
        let size = value.len();
        let old = self.sizes.insert(key.to_string(), size);
        self.counters.write(size, old);
        trace!("{}: set {} ({} bytes)", self.name(), key, size);

        self.transfer(size).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Payload> {
        self.counters.read();
        let size = self.sizes.get(key).map(|s| *s);
        let size = match size {
            Some(size) if !self.sampled_miss() => size,
            _ => {
                self.counters.miss();
                return Err(Error::NotFound {
                    key: key.to_string(),
                });
            }
        };

        self.transfer(size).await;
        Ok(Payload::Sized(size))
    }

    fn stats(&self) -> StorageStats {
        self.counters.snapshot()
    }
}
