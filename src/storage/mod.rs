//! Backing Storage Adapters
//!
//! The replay driver reads through to a backing store on cache misses and
//! writes objects back when the store does not have them. Adapters must keep
//! "not found" ([`Error::NotFound`]) distinct from every other failure so miss
//! accounting stays correct.
//!
//! - [`InMemoryStore`]: keeps payloads in a sharded map
//! - [`DummyStore`]: keeps sizes only and simulates transfer time
//!
//! [`timed_get`] and [`timed_set`] wrap any adapter and emit one
//! [`OpRecord`] per operation.

mod dummy;
mod eval;
mod memory;

pub use dummy::{DummyKind, DummyStore, DEFAULT_MISS_RATIO};
pub use eval::{timed_get, timed_set, Command, OpRecord, ResultCode, EVAL_TARGET};
pub use memory::InMemoryStore;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::{Error, Result};

/// Object body exchanged with a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Real bytes
    Data(Bytes),
    /// Size only; reading the body is not supported
    Sized(usize),
}

impl Payload {
    /// Body length in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Data(data) => data.len(),
            Payload::Sized(size) => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The body, if this payload carries one
    pub fn bytes(&self) -> Result<Bytes> {
        match self {
            Payload::Data(data) => Ok(data.clone()),
            Payload::Sized(_) => Err(Error::NotSupported("read of sized payload".to_string())),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Data(data)
    }
}

/// Store operated on by the replay driver
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Adapter name for logs and reports
    fn name(&self) -> &str;

    /// Store `value` under `key`
    async fn set(&self, key: &str, value: Payload) -> Result<()>;

    /// Fetch `key`; a missing key is `Error::NotFound`
    async fn get(&self, key: &str) -> Result<Payload>;

    /// Operation counters
    fn stats(&self) -> StorageStats;
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Objects stored
    pub object_count: u64,
    /// Bytes stored
    pub total_bytes: u64,
    /// Get operations
    pub reads: u64,
    /// Set operations
    pub writes: u64,
    /// Gets answered with not found
    pub misses: u64,
}

/// Shared operation counters
#[derive(Debug, Default)]
struct Counters {
    object_count: AtomicU64,
    total_bytes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a write that replaced `old` bytes (None for a new key)
    fn write(&self, new: usize, old: Option<usize>) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        match old {
            Some(old) => {
                self.total_bytes.fetch_add(new as u64, Ordering::Relaxed);
                self.total_bytes.fetch_sub(old as u64, Ordering::Relaxed);
            }
            None => {
                self.object_count.fetch_add(1, Ordering::Relaxed);
                self.total_bytes.fetch_add(new as u64, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> StorageStats {
        StorageStats {
            object_count: self.object_count.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Time to move `size` bytes at `bandwidth` bytes/second (0 = instant)
pub fn transfer_time(size: usize, bandwidth: u64) -> Duration {
    if bandwidth == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(size as f64 / bandwidth as f64)
}
