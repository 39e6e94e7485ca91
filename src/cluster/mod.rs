//! Simulated Function-Node Cluster
//!
//! Memory-bounded function nodes acting as cache slots for object chunks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           NodePool                               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  segment 0 (n)    │ segment 1 (n)   │ segment 2 (2n)  │  ...     │
//! │  ┌─────┬─────┐    │ ┌─────┬─────┐   │ ┌─────┬─────┐   │          │
//! │  │Node0│Node1│    │ │ ... │ ... │   │ │ ... │ ... │   │          │
//! │  └─────┴─────┘    │ └─────┴─────┘   │ └─────┴─────┘   │          │
//! └──────────────────────────────────────────────────────────────────┘
//!        each Node: chunk map │ atomic memory counter │ owned blocks
//! ```
//!
//! The pool only grows. Reads below the published length never take a lock.

mod chunk;
mod node;
mod pool;

pub use chunk::{Chunk, Object};
pub use node::Node;
pub use pool::NodePool;

/// One megabyte as used for function sizing
pub const MB: u64 = 1_000_000;

/// Memory a node consumes before holding any chunk (250MB)
pub const DEFAULT_NODE_OVERHEAD: u64 = 250 * MB;

/// Memory a node may hold in total (1536MB)
pub const DEFAULT_NODE_CAPACITY: u64 = 1536 * MB;

/// Virtual blocks pre-allocated per node by the weighted balancer
pub const BLOCKS_PER_NODE: usize = 100;

/// Billing granularity of function activity
pub const BILLING_MINUTE_NANOS: i64 = 60 * 1_000_000_000;
