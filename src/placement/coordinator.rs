//! Placement Coordinator
//!
//! Per-key single-flight resolution of placements. The first caller for a key
//! installs a pending cell and becomes its resolver; concurrent callers wait
//! on that cell without polling and all observe the resolver's value.
//!
//! Clearing a key removes its cell and cancels it if still pending. Woken
//! waiters that find the key marked cleared return [`PlacementLookup::Cleared`];
//! otherwise they retry from the top.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::{debug, trace};

use super::cell::{CellState, PlacementCell};
use super::Placements;
use crate::error::{Error, Result};

/// Outcome of a placement lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementLookup {
    /// First request for the key; the caller must resolve with
    /// `set_placements` (or release with `clear_placements`)
    Vacant,
    /// First request after the key was cleared; the caller owns the new
    /// pending cell and must resolve it with `reset_placements`
    Reclaimed,
    /// The cell this caller waited on was cleared; nothing to wait for
    Cleared,
    /// Placements resolved by another caller
    Resolved(Placements),
}

impl PlacementLookup {
    /// False only for a key never seen before
    pub fn already_seen(&self) -> bool {
        !matches!(self, PlacementLookup::Vacant)
    }

    /// Resolved placements, if any
    pub fn placements(&self) -> Option<&Placements> {
        match self {
            PlacementLookup::Resolved(p) => Some(p),
            _ => None,
        }
    }

    /// True if the caller now owns a pending cell
    pub fn is_resolver(&self) -> bool {
        matches!(self, PlacementLookup::Vacant | PlacementLookup::Reclaimed)
    }
}

/// Single-flight placement table
#[derive(Debug, Default)]
pub struct PlacementCoordinator {
    cells: DashMap<String, Arc<PlacementCell>>,
    cleared: DashSet<String>,
    /// Refuse to reset cells that were never resolved
    strict_reset: bool,
}

impl PlacementCoordinator {
    /// Create a coordinator that allows resetting pending cells
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a coordinator that rejects resets of pending cells
    pub fn strict() -> Self {
        Self {
            strict_reset: true,
            ..Self::default()
        }
    }

    /// Look up placements for `key`, waiting if another caller is resolving them
    pub async fn get_placements(&self, key: &str) -> PlacementLookup {
        loop {
            let cell = match self.cells.entry(key.to_string()) {
                Entry::Occupied(entry) => Arc::clone(entry.get()),
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(PlacementCell::pending()));
                    return if self.cleared.contains(key) {
                        PlacementLookup::Reclaimed
                    } else {
                        PlacementLookup::Vacant
                    };
                }
            };

            match cell.placements(key).await {
                Ok(placements) => return PlacementLookup::Resolved(placements),
                Err(Error::PlacementsCleared { .. }) if self.cleared.contains(key) => {
                    return PlacementLookup::Cleared
                }
                Err(e) => trace!("{}, retrying", e),
            }
        }
    }

    /// Resolve the pending cell for `key`
    pub fn set_placements(&self, key: &str, placements: impl Into<Placements>) -> Result<()> {
        let cell = self
            .cells
            .get(key)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::NoPendingCell {
                key: key.to_string(),
            })?;

        if !cell.resolve(placements.into()) {
            debug!("Placements for {} already resolved, set ignored", key);
        }
        Ok(())
    }

    /// Replace resolved placements, or resolve a pending cell
    pub fn reset_placements(&self, key: &str, placements: impl Into<Placements>) -> Result<()> {
        let mut entry = self.cells.get_mut(key).ok_or_else(|| Error::NoPendingCell {
            key: key.to_string(),
        })?;

        if entry.is_settled() {
            *entry = Arc::new(PlacementCell::resolved(placements.into()));
            return Ok(());
        }

        if self.strict_reset {
            return Err(Error::PlacementsUnset {
                key: key.to_string(),
            });
        }

        self.cleared.remove(key);
        entry.resolve(placements.into());
        Ok(())
    }

    /// Mark `key` cleared and drop its cell, cancelling it if pending
    pub fn clear_placements(&self, key: &str) {
        self.cleared.insert(key.to_string());
        if let Some((_, cell)) = self.cells.remove(key) {
            if cell.cancel() {
                debug!("Cancelled pending placements for {}", key);
            }
        }
    }

    /// Current state of the cell for `key`, without waiting
    pub fn peek(&self, key: &str) -> Option<CellState> {
        self.cells.get(key).map(|c| c.state())
    }

    /// True if `key` carries the cleared marker
    pub fn is_cleared(&self, key: &str) -> bool {
        self.cleared.contains(key)
    }

    /// Number of keys with a cell
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if no key has a cell
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
