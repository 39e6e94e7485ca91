//! Error types for the placement simulator

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while simulating placements
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Placement Protocol Errors
    // =========================================================================
    /// set/reset called without a preceding placement lookup
    #[error("Set placements before get placements first (key: {key})")]
    NoPendingCell { key: String },

    /// Delivered to waiters of a cell that was cleared
    #[error("Placements cleared for key: {key}")]
    PlacementsCleared { key: String },

    /// Reset of an unresolved cell under the strict reset policy
    #[error("Placements unset for key: {key}")]
    PlacementsUnset { key: String },

    // =========================================================================
    // Cluster / Balancer Errors
    // =========================================================================
    /// Node index beyond the pool
    #[error("Node not found: {index}")]
    NodeNotFound { index: u64 },

    /// Node index the pool cannot grow to
    #[error("Node index {index} beyond pool limit {max}")]
    NodeIndexOutOfRange { index: u64, max: u64 },

    /// Logical slot outside the balancer's group width
    #[error("Placement slot {slot} out of range (group width {width})")]
    SlotOutOfRange { slot: u64, width: usize },

    /// Balancer used before being bound to a node pool
    #[error("Balancer is not bound to a node pool")]
    BalancerUnbound,

    /// Balancer initialised against an empty pool
    #[error("Node pool is empty")]
    EmptyPool,

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Key not present in the backing store
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Operation not supported by the adapter
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Generic storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Input / Setup Errors
    // =========================================================================
    /// Trace could not be parsed
    #[error("Trace parse error: {0}")]
    TraceParse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for a storage miss, as opposed to a failed operation
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
