//! Per-request outcomes and the end-of-run report.

use std::fmt;

use serde::Serialize;

use crate::storage::StorageStats;

/// How one request was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Enough chunks were resident to rebuild the object
    Hit,
    /// First request for the key
    ColdMiss,
    /// Chunks had been evicted under memory pressure
    EvictionMiss,
    /// Record could not be replayed
    Skipped,
}

impl Outcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::ColdMiss => "cold_miss",
            Outcome::EvictionMiss => "eviction_miss",
            Outcome::Skipped => "skipped",
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Outcome::ColdMiss | Outcome::EvictionMiss)
    }
}

/// Metric label for requests that ended in an error
pub const FAILED_LABEL: &str = "failed";

/// Summary of a replay run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    pub proxy: String,
    pub balancer: String,
    /// Records consumed, skipped and failed included
    pub requests: u64,
    pub hits: u64,
    pub cold_misses: u64,
    pub eviction_misses: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Eviction events
    pub evicted_chunks: u64,
    /// Keys with at least one eviction
    pub evicted_keys: u64,
    pub blocks_migrated: u64,
    pub nodes: u64,
    /// Billing minutes summed over nodes
    pub active_minutes: u64,
    /// Time spent in the balancer's adapt step
    pub balancer_cost_us: u64,
    /// Backing store counters, if one was attached
    pub storage: Option<StorageStats>,
}

impl ReplayReport {
    /// Hits over replayed (not skipped, not failed) requests
    pub fn hit_ratio(&self) -> f64 {
        let served = self.hits + self.cold_misses + self.eviction_misses;
        if served == 0 {
            return 0.0;
        }
        self.hits as f64 / served as f64
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "proxy:            {} ({})", self.proxy, self.balancer)?;
        writeln!(f, "requests:         {}", self.requests)?;
        writeln!(
            f,
            "hits:             {} ({:.2}%)",
            self.hits,
            self.hit_ratio() * 100.0
        )?;
        writeln!(f, "cold misses:      {}", self.cold_misses)?;
        writeln!(f, "eviction misses:  {}", self.eviction_misses)?;
        writeln!(f, "skipped/failed:   {}/{}", self.skipped, self.failed)?;
        writeln!(
            f,
            "evictions:        {} chunks over {} keys",
            self.evicted_chunks, self.evicted_keys
        )?;
        writeln!(f, "blocks migrated:  {}", self.blocks_migrated)?;
        writeln!(f, "nodes:            {}", self.nodes)?;
        writeln!(f, "active minutes:   {}", self.active_minutes)?;
        write!(f, "balancer cost:    {}us", self.balancer_cost_us)
    }
}
