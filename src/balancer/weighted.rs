//! Weighted Balancer
//!
//! Virtual-block partitioning. At `init` the pool's `n` nodes are spread over
//! `BLOCKS_PER_NODE` groups of `n` blocks: block `g * n + j` belongs to node
//! `j`. A block table maps every block to its current owner.
//!
//! - `remap` indirects slot `p` through the current group
//!   (`table[group * n + p]`) and advances the group cursor, so repeated
//!   placements of the same slot rotate over the groups.
//! - `adapt` sheds the overloaded node's oldest blocks round-robin to the
//!   other nodes, raising the node's threshold by one percent per block.
//!   With a single node the target wraps back to the node itself, so the
//!   block only rotates to the back of its queue.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::Balancer;
use crate::cluster::{Chunk, NodePool, Object, BLOCKS_PER_NODE};
use crate::error::{Error, Result};

/// Block-table balancer
#[derive(Debug, Default)]
pub struct WeightedBalancer {
    pool: Option<Arc<NodePool>>,
    /// Block index -> owning node index
    block_table: Vec<AtomicU64>,
    /// Blocks per group (node count at init)
    group_width: usize,
    next_group: AtomicUsize,
    /// Next migration target; held for a whole adapt pass
    next_target: Mutex<u64>,
}

impl WeightedBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group the next `remap` will read
    pub fn next_group(&self) -> usize {
        self.next_group.load(Ordering::Acquire)
    }

    /// Node the next migrated block will go to
    pub fn next_target(&self) -> u64 {
        *self.next_target.lock()
    }

    /// Blocks per group
    pub fn group_width(&self) -> usize {
        self.group_width
    }

    /// Current owner of `block`
    pub fn block_owner(&self, block: u64) -> Option<u64> {
        let index = usize::try_from(block).ok()?;
        self.block_table
            .get(index)
            .map(|owner| owner.load(Ordering::Acquire))
    }

    /// Snapshot of the block table
    pub fn block_table(&self) -> Vec<u64> {
        self.block_table
            .iter()
            .map(|owner| owner.load(Ordering::Acquire))
            .collect()
    }

    /// Map slots through `group` without touching the group cursor
    pub fn remap_in_group(&self, group: usize, placements: &[u64]) -> Result<Vec<u64>> {
        let width = self.group_width;
        if self.block_table.is_empty() {
            return Err(Error::Internal(
                "weighted balancer used before init".to_string(),
            ));
        }

        placements
            .iter()
            .map(|&slot| {
                let offset = usize::try_from(slot)
                    .ok()
                    .filter(|&s| s < width)
                    .ok_or(Error::SlotOutOfRange { slot, width })?;
                let block = (group % BLOCKS_PER_NODE) * width + offset;
                Ok(self.block_table[block].load(Ordering::Acquire))
            })
            .collect()
    }

    fn pool(&self) -> Result<&Arc<NodePool>> {
        self.pool.as_ref().ok_or(Error::BalancerUnbound)
    }
}

impl Balancer for WeightedBalancer {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn bind(&mut self, pool: Arc<NodePool>) {
        self.pool = Some(pool);
    }

    fn init(&mut self) -> Result<()> {
        let pool = Arc::clone(self.pool()?);
        let width = pool.size();
        if width == 0 {
            return Err(Error::EmptyPool);
        }

        self.block_table = (0..BLOCKS_PER_NODE)
            .flat_map(|_| (0..width as u64).map(AtomicU64::new))
            .collect();
        for (j, node) in pool.iter().enumerate() {
            node.assign_blocks((0..BLOCKS_PER_NODE).map(|g| (g * width + j) as u64));
        }

        self.group_width = width;
        self.next_group.store(0, Ordering::Release);
        *self.next_target.lock() = 0;

        info!(
            "Weighted balancer initialised: {} nodes, {} blocks",
            width,
            self.block_table.len()
        );
        Ok(())
    }

    fn remap(&self, placements: &[u64], _object: &Object) -> Result<Vec<u64>> {
        let width = self.group_width;
        if let Some(&slot) = placements.iter().find(|&&s| s >= width as u64) {
            return Err(Error::SlotOutOfRange { slot, width });
        }

        let group = self
            .next_group
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |g| {
                Some((g + 1) % BLOCKS_PER_NODE)
            })
            .unwrap_or_else(|g| g);
        self.remap_in_group(group, placements)
    }

    fn adapt(&self, node_index: u64, chunk: &Chunk) -> Result<usize> {
        let pool = self.pool()?;
        let node = pool
            .node(node_index)
            .ok_or(Error::NodeNotFound { index: node_index })?;

        let mut target = self.next_target.lock();
        let mut moved = 0;

        while node.used_percentile() > node.usage_threshold() {
            let size = pool.size() as u64;
            if *target == node_index {
                *target = (*target + 1) % size;
            }
            let dest = pool
                .node(*target)
                .ok_or(Error::NodeNotFound { index: *target })?;

            let Some(block) = node.pop_oldest_block() else {
                break;
            };
            let owner = usize::try_from(block)
                .ok()
                .and_then(|b| self.block_table.get(b))
                .ok_or_else(|| Error::Internal(format!("block {} outside table", block)))?;

            dest.push_block(block);
            owner.store(*target, Ordering::Release);
            debug!(
                "Moved block {} from node {} to node {} (chunk {})",
                block, node_index, *target, chunk.key
            );

            *target = (*target + 1) % size;
            node.raise_threshold();
            moved += 1;
        }

        Ok(moved)
    }

    fn close(&self) {
        debug!("close");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Record;
    use assert_matches::assert_matches;

    fn setup(nodes: usize, capacity: u64) -> (Arc<NodePool>, WeightedBalancer) {
        let pool = Arc::new(NodePool::with_sizing(nodes, capacity, 0));
        let mut balancer = WeightedBalancer::new();
        balancer.bind(Arc::clone(&pool));
        balancer.init().unwrap();
        (pool, balancer)
    }

    fn object() -> Object {
        Object::new(Record::new("obj", 40, 0), 2, 1)
    }

    #[test]
    fn test_init_requires_pool() {
        let mut balancer = WeightedBalancer::new();
        assert_matches!(balancer.init(), Err(Error::BalancerUnbound));

        balancer.bind(Arc::new(NodePool::new(0)));
        assert_matches!(balancer.init(), Err(Error::EmptyPool));
    }

    #[test]
    fn test_init_layout() {
        let (pool, balancer) = setup(3, 1000);

        assert_eq!(balancer.block_table().len(), 300);
        assert_eq!(balancer.group_width(), 3);
        assert_eq!(balancer.block_owner(4), Some(1));
        assert_eq!(balancer.block_owner(300), None);

        let blocks = pool.node(2).unwrap().owned_blocks();
        assert_eq!(blocks.len(), BLOCKS_PER_NODE);
        assert_eq!(&blocks[..3], &[2, 5, 8]);
    }

    #[test]
    fn test_remap_advances_group() {
        let (pool, balancer) = setup(4, 1000);
        let obj = object();

        // Move block 1 * 4 + 2 (group 1, slot 2) to node 0
        pool.node(0).unwrap().push_block(6);
        balancer.block_table[6].store(0, Ordering::Release);

        assert_eq!(balancer.remap(&[0, 1, 2], &obj).unwrap(), vec![0, 1, 2]);
        assert_eq!(balancer.next_group(), 1);
        assert_eq!(balancer.remap(&[0, 1, 2], &obj).unwrap(), vec![0, 1, 0]);
        assert_eq!(balancer.next_group(), 2);
    }

    #[test]
    fn test_group_cursor_wraps() {
        let (_pool, balancer) = setup(2, 1000);
        let obj = object();
        for _ in 0..BLOCKS_PER_NODE {
            balancer.remap(&[0], &obj).unwrap();
        }
        assert_eq!(balancer.next_group(), 0);
    }

    #[test]
    fn test_remap_rejects_wide_slot() {
        let (_pool, balancer) = setup(2, 1000);
        let err = balancer.remap(&[0, 2], &object()).unwrap_err();
        assert_matches!(err, Error::SlotOutOfRange { slot: 2, width: 2 });
        // Failed remaps do not consume a group
        assert_eq!(balancer.next_group(), 0);
    }

    #[test]
    fn test_adapt_sheds_until_threshold() {
        let (pool, balancer) = setup(4, 1000);
        let node = pool.node(0).unwrap();
        node.add_chunk(Chunk::new("0@obj", 35));
        assert_eq!(node.used_percentile(), 3);

        let moved = balancer.adapt(0, &Chunk::new("0@obj", 35)).unwrap();
        assert_eq!(moved, 3);
        assert_eq!(node.usage_threshold(), 3);
        assert_eq!(node.owned_block_count(), BLOCKS_PER_NODE - 3);

        // Oldest blocks of node 0 went round-robin to nodes 1, 2, 3
        assert_eq!(balancer.block_owner(0), Some(1));
        assert_eq!(balancer.block_owner(4), Some(2));
        assert_eq!(balancer.block_owner(8), Some(3));
        assert_eq!(pool.node(1).unwrap().owned_blocks().last(), Some(&0));
        assert_eq!(pool.node(3).unwrap().owned_blocks().last(), Some(&8));
        assert_eq!(balancer.next_target(), 0);
    }

    #[test]
    fn test_adapt_skips_overloaded_target() {
        let (pool, balancer) = setup(3, 1000);
        pool.node(1).unwrap().add_chunk(Chunk::new("a", 20));

        // Cursor starts at 0, then lands on 1 and must skip it
        assert_eq!(balancer.adapt(1, &Chunk::new("a", 20)).unwrap(), 2);
        assert_eq!(balancer.block_owner(1), Some(0));
        assert_eq!(balancer.block_owner(4), Some(2));
        assert_eq!(balancer.next_target(), 0);
    }

    #[test]
    fn test_adapt_below_threshold_is_noop() {
        let (pool, balancer) = setup(2, 1000);
        pool.node(0).unwrap().add_chunk(Chunk::new("a", 5));

        assert_eq!(balancer.adapt(0, &Chunk::new("a", 5)).unwrap(), 0);
        assert_eq!(pool.node(0).unwrap().owned_block_count(), BLOCKS_PER_NODE);
    }

    #[test]
    fn test_adapt_stops_when_out_of_blocks() {
        let (pool, balancer) = setup(2, 100);
        pool.node(0).unwrap().add_chunk(Chunk::new("huge", 500));

        let moved = balancer.adapt(0, &Chunk::new("huge", 500)).unwrap();
        assert_eq!(moved, BLOCKS_PER_NODE);
        assert_eq!(pool.node(0).unwrap().owned_block_count(), 0);
        assert_eq!(pool.node(1).unwrap().owned_block_count(), 2 * BLOCKS_PER_NODE);
        assert!(balancer.block_table().iter().all(|&owner| owner == 1));
    }

    #[test]
    fn test_adapt_single_node_rotates_blocks() {
        let (pool, balancer) = setup(1, 100);
        let node = pool.node(0).unwrap();
        node.add_chunk(Chunk::new("a", 5));

        assert_eq!(balancer.adapt(0, &Chunk::new("a", 5)).unwrap(), 5);
        assert_eq!(node.usage_threshold(), 5);
        assert_eq!(node.owned_block_count(), BLOCKS_PER_NODE);

        // Blocks 0..5 moved to the back of the queue and still belong to node 0
        let blocks = node.owned_blocks();
        assert_eq!(blocks.first(), Some(&5));
        assert_eq!(&blocks[BLOCKS_PER_NODE - 5..], &[0, 1, 2, 3, 4]);
        assert!(balancer.block_table().iter().all(|&owner| owner == 0));
        assert_eq!(balancer.next_target(), 0);

        // Threshold caught up, so a second pass has nothing to do
        assert_eq!(balancer.adapt(0, &Chunk::new("a", 5)).unwrap(), 0);
    }

    #[test]
    fn test_adapt_unknown_node() {
        let (_pool, balancer) = setup(2, 100);
        assert_matches!(
            balancer.adapt(9, &Chunk::new("a", 1)),
            Err(Error::NodeNotFound { index: 9 })
        );
    }

    #[test]
    fn test_migration_to_grown_node() {
        let (pool, balancer) = setup(2, 1000);
        pool.ensure_node(2).unwrap();
        pool.node(0).unwrap().add_chunk(Chunk::new("a", 20));

        balancer.adapt(0, &Chunk::new("a", 20)).unwrap();
        // Targets 1 then 2, a node added after init
        assert_eq!(balancer.block_owner(0), Some(1));
        assert_eq!(balancer.block_owner(2), Some(2));
    }
}
