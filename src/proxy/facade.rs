//! Proxy
//!
//! Owns the shared simulation state. Every method takes `&self`; the proxy is
//! shared across request tasks behind an `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ledger::{EvictionLedger, EvictionRecord};
use crate::balancer::Balancer;
use crate::cluster::{Chunk, Node, NodePool, Object, DEFAULT_NODE_CAPACITY, DEFAULT_NODE_OVERHEAD};
use crate::error::{Error, Result};
use crate::placement::{PlacementCoordinator, PlacementLookup, Placements};

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Nodes created up front (and the balancer's group width)
    pub initial_nodes: usize,
    /// Node memory capacity in bytes
    pub node_capacity: u64,
    /// Node fixed overhead in bytes
    pub node_overhead: u64,
    /// Reject resets of placements that were never resolved
    pub strict_reset: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            initial_nodes: 10,
            node_capacity: DEFAULT_NODE_CAPACITY,
            node_overhead: DEFAULT_NODE_OVERHEAD,
            strict_reset: false,
        }
    }
}

/// Simulated cache proxy
pub struct Proxy {
    id: String,
    pool: Arc<NodePool>,
    placements: PlacementCoordinator,
    balancer: Box<dyn Balancer>,
    evictions: EvictionLedger,
    /// Wall-clock nanoseconds spent in `adapt`
    balancer_cost: AtomicU64,
    blocks_migrated: AtomicU64,
}

impl Proxy {
    /// Create a proxy, binding and initialising `balancer` on a fresh pool
    pub fn new(
        id: impl Into<String>,
        config: &ProxyConfig,
        mut balancer: Box<dyn Balancer>,
    ) -> Result<Self> {
        let id = id.into();
        if config.node_capacity == 0 {
            return Err(Error::Config("node_capacity must be positive".to_string()));
        }
        let pool = Arc::new(NodePool::with_sizing(
            config.initial_nodes,
            config.node_capacity,
            config.node_overhead,
        ));

        balancer.bind(Arc::clone(&pool));
        balancer.init()?;

        let placements = if config.strict_reset {
            PlacementCoordinator::strict()
        } else {
            PlacementCoordinator::new()
        };

        info!(
            "Proxy {} ready: {} nodes, {} balancer",
            id,
            pool.size(),
            balancer.name()
        );

        Ok(Self {
            id,
            pool,
            placements,
            balancer,
            evictions: EvictionLedger::new(),
            balancer_cost: AtomicU64::new(0),
            blocks_migrated: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.pool.size()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    /// Node at `index`, growing the pool if needed
    pub fn ensure_node(&self, index: u64) -> Result<&Node> {
        self.pool.ensure_node(index)
    }

    pub fn node(&self, index: u64) -> Option<&Node> {
        self.pool.node(index)
    }

    pub fn balancer_name(&self) -> &'static str {
        self.balancer.name()
    }

    // =========================================================================
    // Balancer
    // =========================================================================

    /// Map abstract slots onto node indices
    pub fn remap(&self, placements: &[u64], object: &Object) -> Result<Vec<u64>> {
        self.balancer.remap(placements, object)
    }

    /// Run the balancer after `chunk` landed on `node_index`
    pub fn adapt(&self, node_index: u64, chunk: &Chunk) -> Result<usize> {
        let start = Instant::now();
        let result = self.balancer.adapt(node_index, chunk);
        let elapsed = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.balancer_cost.fetch_add(elapsed, Ordering::Relaxed);

        let moved = result?;
        if moved > 0 {
            self.blocks_migrated
                .fetch_add(moved as u64, Ordering::Relaxed);
            debug!("Node {} shed {} blocks", node_index, moved);
        }
        Ok(moved)
    }

    pub fn validate(&self, object: &Object) -> bool {
        self.balancer.validate(object)
    }

    /// Total time spent in `adapt`
    pub fn balancer_cost(&self) -> Duration {
        Duration::from_nanos(self.balancer_cost.load(Ordering::Relaxed))
    }

    /// Total blocks moved by `adapt`
    pub fn blocks_migrated(&self) -> u64 {
        self.blocks_migrated.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Placements
    // =========================================================================

    /// Placements of `key`, waiting while another task resolves them
    pub async fn placements(&self, key: &str) -> PlacementLookup {
        self.placements.get_placements(key).await
    }

    pub fn set_placements(&self, key: &str, placements: impl Into<Placements>) -> Result<()> {
        self.placements.set_placements(key, placements)
    }

    pub fn reset_placements(&self, key: &str, placements: impl Into<Placements>) -> Result<()> {
        self.placements.reset_placements(key, placements)
    }

    pub fn clear_placements(&self, key: &str) {
        self.placements.clear_placements(key)
    }

    // =========================================================================
    // Evictions
    // =========================================================================

    /// Record a pressure eviction of `chunk` belonging to `key`
    pub fn evict(&self, key: &str, chunk: Chunk) {
        self.evictions.record(key, chunk);
    }

    /// Latest chunk evicted for `key`
    pub fn evicted(&self, key: &str) -> Option<Chunk> {
        self.evictions.lookup(key)
    }

    /// Number of keys with evictions
    pub fn num_evicts(&self) -> usize {
        self.evictions.num_keys()
    }

    pub fn evictions(&self) -> impl Iterator<Item = EvictionRecord> {
        self.evictions.iter()
    }

    pub fn ledger(&self) -> &EvictionLedger {
        &self.evictions
    }

    /// Total billing minutes across nodes
    pub fn active_minutes(&self) -> u64 {
        self.pool.iter().map(Node::active_minutes).sum()
    }

    /// Release the balancer
    pub fn close(&self) {
        self.balancer.close();
        info!(
            "Proxy {} closed: {} nodes, {} evicted keys, balancer cost {:?}",
            self.id,
            self.len(),
            self.num_evicts(),
            self.balancer_cost()
        );
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id)
            .field("pool", &self.pool)
            .field("balancer", &self.balancer.name())
            .field("placements", &self.placements.len())
            .field("evictions", &self.evictions.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
