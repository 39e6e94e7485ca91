//! Proxy Façade
//!
//! Composes the node pool, the placement coordinator, a balancer and the
//! eviction ledger behind the per-request API the replay driver calls.
//!
//! ```text
//!                 ┌─────────────────────────────────────────┐
//!  replay ──────▶ │                 Proxy                   │
//!                 ├──────────┬──────────────┬───────────────┤
//!                 │ NodePool │ Placement    │ dyn Balancer  │
//!                 │          │ Coordinator  │               │
//!                 ├──────────┴──────────────┴───────────────┤
//!                 │             EvictionLedger              │
//!                 └─────────────────────────────────────────┘
//! ```

mod facade;
mod ledger;

pub use facade::{Proxy, ProxyConfig};
pub use ledger::{EvictionLedger, EvictionRecord};
