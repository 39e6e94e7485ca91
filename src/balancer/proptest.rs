//! Property-Based Tests for Node Accounting and the Weighted Balancer
//!
//! # Test Properties
//!
//! 1. **Memory Conservation**: `memory_used - overhead` equals the stored chunk sizes
//! 2. **Block Table Completeness**: every block owned by exactly one node after init
//! 3. **Adapt Monotonicity**: thresholds never drop, owners never duplicate
//! 4. **Remap Determinism**: same table and group give the same mapping

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use super::{Balancer, WeightedBalancer};
use crate::cluster::{Chunk, Node, NodePool, BLOCKS_PER_NODE};

// =============================================================================
// Property Strategies
// =============================================================================

/// Add (true) or remove (false) a chunk key with a size
fn chunk_ops_strategy() -> impl Strategy<Value = Vec<(bool, u8, u64)>> {
    prop::collection::vec((any::<bool>(), 0u8..16, 1u64..10_000), 1..200)
}

/// Sequence of (node, chunk size) loads
fn load_strategy(nodes: usize) -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((0..nodes as u64, 1u64..200), 1..60)
}

fn bound_balancer(pool: &Arc<NodePool>) -> WeightedBalancer {
    let mut balancer = WeightedBalancer::new();
    balancer.bind(Arc::clone(pool));
    balancer
        .init()
        .expect("init on non-empty pool must succeed");
    balancer
}

/// Every block index appears in exactly one node's list and the table agrees
fn assert_ownership_consistent(
    pool: &NodePool,
    balancer: &WeightedBalancer,
) -> Result<(), TestCaseError> {
    let table = balancer.block_table();
    let mut seen: HashMap<u64, u64> = HashMap::new();
    for node in pool.iter() {
        for block in node.owned_blocks() {
            prop_assert!(
                seen.insert(block, node.id()).is_none(),
                "block {} owned twice",
                block
            );
            prop_assert_eq!(table[block as usize], node.id());
        }
    }
    prop_assert_eq!(seen.len(), table.len());
    Ok(())
}

// =============================================================================
// Node Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: memory counter tracks exactly the stored chunks.
    #[test]
    fn prop_memory_conservation(ops in chunk_ops_strategy(), overhead in 0u64..1_000) {
        let node = Node::new(0, 1_000_000, overhead);

        for (add, key, size) in ops {
            let key = format!("{}@obj", key);
            if add {
                node.add_chunk(Chunk::new(key, size));
            } else {
                node.remove_chunk(&key);
            }

            let stored: u64 = node.chunks().map(|(_, c)| c.size).sum();
            prop_assert_eq!(node.memory_used() - overhead, stored);
        }
    }
}

// =============================================================================
// Balancer Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: init hands out 100 blocks per node, each exactly once.
    #[test]
    fn prop_block_table_complete(nodes in 1usize..24) {
        let pool = Arc::new(NodePool::new(nodes));
        let balancer = bound_balancer(&pool);

        prop_assert_eq!(balancer.block_table().len(), BLOCKS_PER_NODE * nodes);
        for node in pool.iter() {
            prop_assert_eq!(node.owned_block_count(), BLOCKS_PER_NODE);
        }
        assert_ownership_consistent(&pool, &balancer)?;
    }

    /// Property: adapt only raises thresholds, only sheds blocks from the
    /// adapted node, and never leaves a block with two owners.
    #[test]
    fn prop_adapt_monotonic(
        (nodes, loads) in (2usize..8).prop_flat_map(|n| (Just(n), load_strategy(n)))
    ) {
        let pool = Arc::new(NodePool::with_sizing(nodes, 1_000, 0));
        let balancer = bound_balancer(&pool);

        for (i, (index, size)) in loads.into_iter().enumerate() {
            let node = pool.node(index).unwrap();
            let chunk = Chunk::new(format!("{}@obj", i), size);
            node.add_chunk(chunk.clone());

            let threshold = node.usage_threshold();
            let owned = node.owned_block_count();

            let moved = balancer.adapt(index, &chunk).unwrap();

            prop_assert!(node.usage_threshold() >= threshold);
            prop_assert_eq!(node.usage_threshold() - threshold, moved as u64);
            prop_assert_eq!(node.owned_block_count(), owned - moved);
            prop_assert!(
                node.owned_block_count() == 0
                    || node.used_percentile() <= node.usage_threshold()
            );
            assert_ownership_consistent(&pool, &balancer)?;
        }
    }

    /// Property: remapping is a pure function of table, group and slots.
    #[test]
    fn prop_remap_deterministic(
        nodes in 1usize..16,
        group in 0usize..BLOCKS_PER_NODE,
        seed in prop::collection::vec(any::<u64>(), 0..12),
    ) {
        let pool = Arc::new(NodePool::new(nodes));
        let balancer = bound_balancer(&pool);
        let slots: Vec<u64> = seed.into_iter().map(|s| s % nodes as u64).collect();

        let first = balancer.remap_in_group(group, &slots).unwrap();
        let second = balancer.remap_in_group(group, &slots).unwrap();
        prop_assert_eq!(&first, &second);

        let table = balancer.block_table();
        for (slot, node) in slots.iter().zip(&first) {
            prop_assert_eq!(table[group * nodes + *slot as usize], *node);
        }
    }
}
