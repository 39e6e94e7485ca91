//! sionsim - Elastic Function-Cache Placement Simulator
//!
//! Replays request traces against a simulated cluster of memory-bounded
//! function nodes to evaluate chunk placement and load-balancing strategies
//! without running real infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────────────────────────────────┐
//! │ Trace reader │───▶│                  Replayer                    │
//! └──────────────┘    └───────────────┬──────────────────┬───────────┘
//!                                     │                  │ misses
//!                                     ▼                  ▼
//!                     ┌──────────────────────────┐  ┌──────────────┐
//!                     │          Proxy           │  │   Storage    │
//!                     │ NodePool │ Placements    │  │   adapter    │
//!                     │ Balancer │ EvictionLedger│  └──────────────┘
//!                     └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`balancer`] - Placement strategies (weighted block table, passthrough)
//! - [`cluster`] - Chunks, objects, nodes and the growable node pool
//! - [`config`] - JSON configuration file
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus counters for a replay run
//! - [`placement`] - Single-flight placement resolution
//! - [`proxy`] - Façade over pool, placements, balancer and eviction ledger
//! - [`replay`] - Trace replay driver and report
//! - [`storage`] - Backing store adapters
//! - [`trace`] - Trace records and readers

pub mod balancer;
pub mod cluster;
pub mod config;
pub mod error;
pub mod metrics;
pub mod placement;
pub mod proxy;
pub mod replay;
pub mod storage;
pub mod trace;

// Re-export commonly used types
pub use balancer::{Balancer, PassthroughBalancer, WeightedBalancer};
pub use cluster::{Chunk, Node, NodePool, Object};
pub use config::SimulatorConfig;
pub use error::{Error, Result};
pub use placement::{PlacementCoordinator, PlacementLookup, Placements};
pub use proxy::{EvictionLedger, Proxy, ProxyConfig};
pub use replay::{Outcome, ReplayConfig, ReplayReport, Replayer};
pub use storage::{DummyKind, DummyStore, InMemoryStore, Payload, StorageAdapter};
pub use trace::{AzureFunctionsReader, Record};
