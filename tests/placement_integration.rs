//! Placement Integration Tests
//!
//! End-to-end tests of the proxy's placement protocol and the weighted
//! balancer through the public API.

use std::sync::Arc;
use std::time::Duration;

use sionsim::cluster::{BLOCKS_PER_NODE, MB};
use sionsim::{
    Chunk, Error, Object, PassthroughBalancer, PlacementLookup, Proxy, ProxyConfig, Record,
    WeightedBalancer,
};

fn weighted_proxy(nodes: usize, capacity: u64, overhead: u64) -> Proxy {
    let config = ProxyConfig {
        initial_nodes: nodes,
        node_capacity: capacity,
        node_overhead: overhead,
        strict_reset: false,
    };
    Proxy::new("it", &config, Box::new(WeightedBalancer::new())).expect("proxy")
}

// =============================================================================
// Placement Protocol
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_across_tasks() {
    let proxy = Arc::new(
        Proxy::new(
            "it",
            &ProxyConfig::default(),
            Box::new(PassthroughBalancer::new()),
        )
        .expect("proxy"),
    );

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                match proxy.placements("blob").await {
                    PlacementLookup::Vacant => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        proxy.set_placements("blob", vec![3, 1, 4]).expect("set");
                        None
                    }
                    lookup => lookup.placements().map(|p| p.to_vec()),
                }
            })
        })
        .collect();

    let mut resolvers = 0;
    for task in tasks {
        match task.await.expect("join") {
            None => resolvers += 1,
            Some(placements) => assert_eq!(placements, vec![3, 1, 4]),
        }
    }
    assert_eq!(resolvers, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clear_releases_waiters() {
    let proxy = Arc::new(weighted_proxy(4, 100 * MB, 0));
    assert_eq!(proxy.placements("k").await, PlacementLookup::Vacant);

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move { proxy.placements("k").await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    proxy.clear_placements("k");

    for waiter in waiters {
        let lookup = waiter.await.expect("join");
        assert_eq!(lookup, PlacementLookup::Cleared);
        assert!(lookup.already_seen());
    }
}

#[test]
fn test_set_before_get_is_rejected() {
    let proxy = weighted_proxy(2, 100 * MB, 0);
    assert!(matches!(
        proxy.set_placements("k", vec![0]),
        Err(Error::NoPendingCell { .. })
    ));
}

#[tokio::test]
async fn test_strict_reset_policy() {
    let config = ProxyConfig {
        strict_reset: true,
        ..ProxyConfig::default()
    };
    let proxy = Proxy::new("it", &config, Box::new(PassthroughBalancer::new())).expect("proxy");

    proxy.placements("k").await;
    assert!(matches!(
        proxy.reset_placements("k", vec![0]),
        Err(Error::PlacementsUnset { .. })
    ));
}

// =============================================================================
// Weighted Balancer
// =============================================================================

#[test]
fn test_adapt_end_to_end() {
    let proxy = weighted_proxy(4, 100 * MB, 0);
    let node = proxy.node(0).expect("node 0");
    let obj = Object::new(Record::new("obj", 3 * MB, 0), 3, 0);

    for i in 0..3 {
        node.add_chunk(obj.chunk(i));
    }
    assert_eq!(node.used_percentile(), 3);

    let moved = proxy.adapt(0, &obj.chunk(2)).expect("adapt");
    assert_eq!(moved, 3);
    assert_eq!(node.usage_threshold(), 3);
    assert!(node.used_percentile() <= node.usage_threshold());

    // Node 0's oldest blocks now belong to nodes 1, 2 and 3
    for (block, owner) in [(0u64, 1u64), (4, 2), (8, 3)] {
        let new_owner = proxy.node(owner).expect("owner");
        assert_eq!(new_owner.owned_blocks().last(), Some(&block));
        assert_eq!(new_owner.owned_block_count(), BLOCKS_PER_NODE + 1);
    }

    // Group 0 slot 0 now resolves to node 1
    assert_eq!(proxy.remap(&[0, 1, 2, 3], &obj).expect("remap"), vec![1, 1, 2, 3]);
    assert_eq!(proxy.blocks_migrated(), 3);
}

#[test]
fn test_overhead_counts_as_pressure() {
    let proxy = weighted_proxy(4, 1536 * MB, 250 * MB);
    let moved = proxy.adapt(2, &Chunk::new("0@k", 0)).expect("adapt");
    // 250 / 1536 = 16%
    assert_eq!(moved, 16);
}

#[test]
fn test_remap_spreads_over_groups() {
    let proxy = weighted_proxy(4, 100 * MB, 0);
    let obj = Object::new(Record::new("obj", 10, 0), 1, 0);

    // Shift group 0's slot 0 to node 1
    proxy.node(0).expect("node 0").add_chunk(Chunk::new("0@x", MB));
    proxy.adapt(0, &Chunk::new("0@x", MB)).expect("adapt");

    let owners: Vec<u64> = (0..BLOCKS_PER_NODE)
        .map(|_| proxy.remap(&[0], &obj).expect("remap")[0])
        .collect();
    assert_eq!(owners[0], 1);
    assert!(owners[1..].iter().all(|&owner| owner == 0));
}

#[test]
fn test_single_node_adapt_raises_threshold() {
    let proxy = weighted_proxy(1, 100, 0);
    let node = proxy.node(0).expect("node 0");
    node.add_chunk(Chunk::new("0@k", 5));

    proxy.adapt(0, &Chunk::new("0@k", 5)).expect("adapt");
    assert_eq!(node.usage_threshold(), 5);
    assert_eq!(node.owned_blocks().first(), Some(&5));

    // Rotation leaves every block with node 0
    let obj = Object::new(Record::new("k", 5, 0), 1, 0);
    assert_eq!(proxy.remap(&[0], &obj).expect("remap"), vec![0]);
}
