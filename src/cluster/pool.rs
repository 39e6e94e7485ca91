//! Node Pool
//!
//! Growable, indexable collection of [`Node`]s.
//!
//! # Design
//!
//! - Storage is a fixed table of lazily allocated segments. Segment 0 holds
//!   `base` nodes and every later segment doubles the total capacity, so
//!   growth never moves an existing node.
//! - The number of live nodes is published through an atomic; lookups below
//!   it only read that atomic and an already-initialised segment.
//! - Growth serialises on a mutex, allocates any missing segments and then
//!   publishes the new length.

use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use super::{Node, DEFAULT_NODE_CAPACITY, DEFAULT_NODE_OVERHEAD};
use crate::error::{Error, Result};

/// Segments available; capacity is `base * 2^(MAX_SEGMENTS - 1)`
const MAX_SEGMENTS: usize = 48;

/// Growable pool of function nodes
pub struct NodePool {
    segments: Box<[OnceCell<Box<[Node]>>]>,
    /// Size of segment 0
    base: usize,
    /// Number of live nodes
    len: AtomicUsize,
    grow: Mutex<()>,
    node_capacity: u64,
    node_overhead: u64,
}

impl NodePool {
    /// Create a pool of `initial` nodes with default sizing
    pub fn new(initial: usize) -> Self {
        Self::with_sizing(initial, DEFAULT_NODE_CAPACITY, DEFAULT_NODE_OVERHEAD)
    }

    /// Create a pool of `initial` nodes with explicit node sizing
    pub fn with_sizing(initial: usize, node_capacity: u64, node_overhead: u64) -> Self {
        let segments: Vec<OnceCell<Box<[Node]>>> =
            (0..MAX_SEGMENTS).map(|_| OnceCell::new()).collect();
        let pool = Self {
            segments: segments.into_boxed_slice(),
            base: initial.max(1),
            len: AtomicUsize::new(0),
            grow: Mutex::new(()),
            node_capacity,
            node_overhead,
        };
        if initial > 0 {
            pool.grow_to(initial);
        }
        pool
    }

    /// Number of live nodes
    #[inline]
    pub fn size(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// True if the pool has no nodes
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Slots allocated, live or not
    pub fn allocated(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| s.get().is_some())
            .map(|s| s.get().map_or(0, |nodes| nodes.len()))
            .sum()
    }

    /// Highest node count the pool can grow to
    pub fn max_nodes(&self) -> u64 {
        (self.base as u64).saturating_mul(1u64 << (MAX_SEGMENTS - 1))
    }

    /// Capacity given to nodes created by this pool
    pub fn node_capacity(&self) -> u64 {
        self.node_capacity
    }

    /// Node at `index`, if live
    #[inline]
    pub fn node(&self, index: u64) -> Option<&Node> {
        let index = usize::try_from(index).ok()?;
        if index >= self.size() {
            return None;
        }
        self.slot(index)
    }

    /// Guarantee a node exists at `index`, growing the pool if needed
    pub fn ensure_node(&self, index: u64) -> Result<&Node> {
        let max = self.max_nodes();
        let out_of_range = || Error::NodeIndexOutOfRange { index, max };
        if index >= max {
            return Err(out_of_range());
        }
        let idx = usize::try_from(index).map_err(|_| out_of_range())?;

        if idx >= self.size() {
            self.grow_to(idx + 1);
        }
        self.slot(idx).ok_or_else(|| {
            Error::Internal(format!("node {} missing after growth", idx))
        })
    }

    /// Iterate over live nodes
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        (0..self.size() as u64).filter_map(move |i| self.node(i))
    }

    fn grow_to(&self, len: usize) {
        let _guard = self.grow.lock();
        let current = self.size();
        if len <= current {
            return;
        }

        let (last_segment, _) = self.locate(len - 1);
        for segment in 0..=last_segment {
            self.segments[segment].get_or_init(|| {
                let start = self.segment_start(segment);
                let size = self.segment_len(segment);
                debug!(
                    "Allocating node segment {} ({} nodes from {})",
                    segment, size, start
                );
                (start..start + size)
                    .map(|id| Node::new(id as u64, self.node_capacity, self.node_overhead))
                    .collect::<Vec<_>>()
                    .into_boxed_slice()
            });
        }

        self.len.store(len, Ordering::Release);
        debug!("Node pool grown from {} to {}", current, len);
    }

    fn slot(&self, index: usize) -> Option<&Node> {
        let (segment, offset) = self.locate(index);
        self.segments.get(segment)?.get()?.get(offset)
    }

    /// Map a flat index to (segment, offset)
    fn locate(&self, index: usize) -> (usize, usize) {
        if index < self.base {
            return (0, index);
        }
        let q = index / self.base;
        let segment = (usize::BITS - 1 - q.leading_zeros()) as usize + 1;
        (segment, index - self.segment_start(segment))
    }

    fn segment_start(&self, segment: usize) -> usize {
        match segment {
            0 => 0,
            s => self.base << (s - 1),
        }
    }

    fn segment_len(&self, segment: usize) -> usize {
        match segment {
            0 => self.base,
            s => self.base << (s - 1),
        }
    }
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool")
            .field("size", &self.size())
            .field("allocated", &self.allocated())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
