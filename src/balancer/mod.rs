//! Placement Balancers
//!
//! Strategies that map abstract chunk slots onto concrete nodes and migrate
//! ownership as memory pressure shifts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Proxy                               │
//! │   remap(slots) ──▶ ┌──────────────────────┐ ──▶ node indices     │
//! │   adapt(node)  ──▶ │   dyn Balancer       │ ──▶ blocks migrated  │
//! │                    └──────────┬───────────┘                      │
//! │                               │ bound to                         │
//! │                               ▼                                  │
//! │                    ┌──────────────────────┐                      │
//! │                    │  Arc<NodePool>       │                      │
//! │                    └──────────────────────┘                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`WeightedBalancer`]: virtual-block partitioning with round-robin
//!   migration of the oldest blocks off overloaded nodes
//! - [`PassthroughBalancer`]: identity mapping, never migrates

mod passthrough;
#[cfg(test)]
mod proptest;
mod weighted;

pub use passthrough::PassthroughBalancer;
pub use weighted::WeightedBalancer;

use std::sync::Arc;

use crate::cluster::{Chunk, NodePool, Object};
use crate::error::Result;

/// Pluggable placement strategy
///
/// A balancer owns no nodes. The proxy binds it to its pool, then calls
/// `init` once before any `remap`/`adapt`.
pub trait Balancer: Send + Sync {
    /// Strategy name for logs and reports
    fn name(&self) -> &'static str;

    /// Attach the pool this balancer works on; may be called again to rebind
    fn bind(&mut self, pool: Arc<NodePool>);

    /// Build initial state from the bound pool
    fn init(&mut self) -> Result<()>;

    /// Map abstract slot indices onto node indices
    fn remap(&self, placements: &[u64], object: &Object) -> Result<Vec<u64>>;

    /// React to `chunk` landing on `node_index`; returns blocks migrated
    fn adapt(&self, node_index: u64, chunk: &Chunk) -> Result<usize>;

    /// Policy hook to reject an object's layout
    fn validate(&self, _object: &Object) -> bool {
        true
    }

    /// Release balancer-held resources
    fn close(&self) {}
}
