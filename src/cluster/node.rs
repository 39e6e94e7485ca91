//! Function Node
//!
//! A simulated memory-bounded worker. Chunk bookkeeping is concurrent: the
//! chunk map is sharded and the memory counter is a single atomic, so chunk
//! adds and removes from different request tasks never need a node-wide lock.
//!
//! # Invariant
//!
//! `memory_used == overhead + sum(size of chunks in the map)` whenever no
//! add/remove is in flight. Additions are counted before the chunk becomes
//! visible and removals are uncounted while the map entry is still locked, so
//! the counter never drops below the overhead.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{Chunk, BILLING_MINUTE_NANOS};

/// Billing-minute clock of a node
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Activity {
    active_minutes: u64,
    last_active: i64,
}

/// A simulated cache-capable function node
#[derive(Debug)]
pub struct Node {
    id: u64,
    /// Chunk key -> chunk
    chunks: DashMap<String, Chunk>,
    /// Bytes in use, overhead included
    memory_used: AtomicU64,
    capacity: u64,
    overhead: u64,
    activity: Mutex<Activity>,
    /// Percentile of capacity above which the balancer sheds blocks
    used_percentile_threshold: AtomicU64,
    /// Virtual blocks owned by this node, oldest first
    owned_blocks: Mutex<VecDeque<u64>>,
}

impl Node {
    /// Create an empty node
    pub fn new(id: u64, capacity: u64, overhead: u64) -> Self {
        Self {
            id,
            chunks: DashMap::new(),
            memory_used: AtomicU64::new(overhead),
            capacity,
            overhead,
            activity: Mutex::new(Activity::default()),
            used_percentile_threshold: AtomicU64::new(0),
            owned_blocks: Mutex::new(VecDeque::new()),
        }
    }

    /// Node id (its index in the pool)
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Memory capacity in bytes
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Fixed memory overhead in bytes
    #[inline]
    pub fn overhead(&self) -> u64 {
        self.overhead
    }

    /// Bytes in use, overhead included
    #[inline]
    pub fn memory_used(&self) -> u64 {
        self.memory_used.load(Ordering::Acquire)
    }

    /// `floor(memory_used / capacity * 100)`
    pub fn used_percentile(&self) -> u64 {
        if self.capacity == 0 {
            return u64::MAX;
        }
        ((self.memory_used() as u128 * 100) / self.capacity as u128) as u64
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    /// Store a chunk, replacing any chunk with the same key
    pub fn add_chunk(&self, chunk: Chunk) {
        match self.chunks.entry(chunk.key.clone()) {
            Entry::Occupied(mut entry) => {
                self.memory_used.fetch_add(chunk.size, Ordering::AcqRel);
                let old = entry.insert(chunk);
                self.memory_used.fetch_sub(old.size, Ordering::AcqRel);
            }
            Entry::Vacant(entry) => {
                self.memory_used.fetch_add(chunk.size, Ordering::AcqRel);
                entry.insert(chunk);
            }
        }
    }

    /// Look up a chunk
    pub fn chunk(&self, key: &str) -> Option<Chunk> {
        self.chunks.get(key).map(|c| c.clone())
    }

    /// Record an access to a chunk, returning the updated chunk
    pub fn touch_chunk(&self, key: &str) -> Option<Chunk> {
        let mut entry = self.chunks.get_mut(key)?;
        *entry = entry.accessed();
        Some(entry.clone())
    }

    /// Remove a chunk
    pub fn remove_chunk(&self, key: &str) -> Option<Chunk> {
        match self.chunks.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                self.memory_used
                    .fetch_sub(entry.get().size, Ordering::AcqRel);
                Some(entry.remove())
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Number of chunks stored
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Snapshot scan of the stored chunks
    ///
    /// Each call takes a fresh snapshot; concurrent mutation is not reflected
    /// in an iterator already handed out.
    pub fn chunks(&self) -> impl Iterator<Item = (String, Chunk)> {
        let snapshot: Vec<(String, Chunk)> = self
            .chunks
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        snapshot.into_iter()
    }

    // =========================================================================
    // Activity
    // =========================================================================

    /// Record activity at `timestamp` (nanoseconds)
    ///
    /// The first call opens a billing minute; later calls open another one
    /// only when at least a minute passed since the previous call.
    pub fn activate(&self, timestamp: i64) {
        let mut activity = self.activity.lock();
        if activity.active_minutes == 0
            || timestamp - activity.last_active >= BILLING_MINUTE_NANOS
        {
            activity.active_minutes += 1;
        }
        activity.last_active = timestamp;
    }

    /// Billing minutes accumulated
    pub fn active_minutes(&self) -> u64 {
        self.activity.lock().active_minutes
    }

    /// Timestamp of the last activation
    pub fn last_active(&self) -> i64 {
        self.activity.lock().last_active
    }

    // =========================================================================
    // Balancer state
    // =========================================================================

    /// Current usage threshold (percent)
    pub fn usage_threshold(&self) -> u64 {
        self.used_percentile_threshold.load(Ordering::Acquire)
    }

    /// Raise the usage threshold by one percent, returning the new value
    pub fn raise_threshold(&self) -> u64 {
        self.used_percentile_threshold
            .fetch_add(1, Ordering::AcqRel)
            + 1
    }

    /// Replace the owned block list
    pub fn assign_blocks(&self, blocks: impl IntoIterator<Item = u64>) {
        let mut owned = self.owned_blocks.lock();
        owned.clear();
        owned.extend(blocks);
    }

    /// Take the oldest owned block
    pub fn pop_oldest_block(&self) -> Option<u64> {
        self.owned_blocks.lock().pop_front()
    }

    /// Take ownership of a block
    pub fn push_block(&self, block: u64) {
        self.owned_blocks.lock().push_back(block);
    }

    /// Owned blocks, oldest first
    pub fn owned_blocks(&self) -> Vec<u64> {
        self.owned_blocks.lock().iter().copied().collect()
    }

    /// Number of owned blocks
    pub fn owned_block_count(&self) -> usize {
        self.owned_blocks.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
