//! Placement Cell
//!
//! Single-assignment cell holding a key's placements. It starts pending and
//! moves exactly once to either resolved or cancelled; every waiter is woken
//! on that transition and observes the same final state.

use tokio::sync::watch;

use super::Placements;
use crate::error::{Error, Result};

/// State of a placement cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellState {
    /// Waiting for the resolver
    Pending,
    /// Resolved with placements
    Resolved(Placements),
    /// Cancelled by a clear
    Cancelled,
}

impl CellState {
    /// True while no resolution has happened
    pub fn is_pending(&self) -> bool {
        matches!(self, CellState::Pending)
    }
}

/// Single-assignment placement cell with broadcast wake-up
#[derive(Debug)]
pub struct PlacementCell {
    state: watch::Sender<CellState>,
}

impl PlacementCell {
    /// Create an unresolved cell
    pub fn pending() -> Self {
        let (state, _) = watch::channel(CellState::Pending);
        Self { state }
    }

    /// Create an already resolved cell
    pub fn resolved(placements: Placements) -> Self {
        let (state, _) = watch::channel(CellState::Resolved(placements));
        Self { state }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> CellState {
        self.state.borrow().clone()
    }

    /// True once resolved or cancelled
    pub fn is_settled(&self) -> bool {
        !self.state.borrow().is_pending()
    }

    /// Resolve the cell; returns false if it was already settled
    pub fn resolve(&self, placements: Placements) -> bool {
        self.settle(CellState::Resolved(placements))
    }

    /// Cancel the cell; returns false if it was already settled
    pub fn cancel(&self) -> bool {
        self.settle(CellState::Cancelled)
    }

    fn settle(&self, next: CellState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the cell is settled and return the final state
    pub async fn wait(&self) -> CellState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|s| !s.is_pending()).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so it cannot be dropped while we wait
            Err(_) => CellState::Cancelled,
        };
        settled
    }

    /// Wait for the resolved placements of `key`; a cancelled cell yields
    /// `Error::PlacementsCleared`
    pub async fn placements(&self, key: &str) -> Result<Placements> {
        match self.wait().await {
            CellState::Resolved(placements) => Ok(placements),
            _ => Err(Error::PlacementsCleared {
                key: key.to_string(),
            }),
        }
    }
}
