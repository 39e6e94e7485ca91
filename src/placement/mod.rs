//! Placement Resolution
//!
//! Single-flight resolution of "which nodes hold this key's chunks".
//!
//! ```text
//!  caller A ──get──▶ [no cell] ──insert pending──▶ Vacant (A resolves)
//!  caller B ──get──▶ [pending] ──────wait──────┐
//!  caller C ──get──▶ [pending] ──────wait──────┤
//!  caller A ──set──▶ [resolved(v)] ────wake────┴──▶ Resolved(v)
//! ```

mod cell;
mod coordinator;

pub use cell::{CellState, PlacementCell};
pub use coordinator::{PlacementCoordinator, PlacementLookup};

use std::sync::Arc;

/// Node indices holding a key's chunks, in chunk order
pub type Placements = Arc<[u64]>;
