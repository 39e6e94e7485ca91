//! Trace Replay
//!
//! Drives a [`Proxy`](crate::proxy::Proxy) with trace records.
//!
//! # Request flow
//!
//! ```text
//!  record ──▶ Object ──▶ placements(key)
//!                          │
//!        ┌─────────────────┼───────────────────────┐
//!        ▼                 ▼                       ▼
//!   Vacant/Reclaimed    Resolved(nodes)          Cleared
//!   remap ▸ add chunks  count resident chunks    look up again
//!   evict ▸ adapt       ≥ data chunks ? hit
//!   set/reset           : miss ▸ re-place ▸ reset
//! ```
//!
//! Misses read through to the backing store when one is attached; a store
//! miss writes the object back.

mod driver;
mod report;

pub use driver::Replayer;
pub use report::{Outcome, ReplayReport, FAILED_LABEL};

use serde::{Deserialize, Serialize};

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Data chunks per object
    pub data_chunks: usize,
    /// Parity chunks per object
    pub parity_chunks: usize,
    /// Requests in flight at once
    pub max_concurrency: usize,
    /// Objects above this size are skipped (0 = no limit)
    pub max_payload_bytes: u64,
    /// Transfer bandwidth in bytes/second for estimates (0 = unknown)
    pub bandwidth: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            data_chunks: 4,
            parity_chunks: 2,
            max_concurrency: 64,
            max_payload_bytes: 0,
            bandwidth: 0,
        }
    }
}

impl ReplayConfig {
    /// Chunks stored per object
    pub fn total_chunks(&self) -> usize {
        self.data_chunks + self.parity_chunks
    }
}
