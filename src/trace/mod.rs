//! Request Traces
//!
//! Trace records are produced lazily by readers and consumed once, in order,
//! by the replay driver. A record that failed to parse is still yielded so the
//! driver can count it; it carries the parse failure in [`Record::error`].

mod azure;

pub use azure::AzureFunctionsReader;

use serde::{Deserialize, Serialize};

/// One request in a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Request time in nanoseconds since the trace epoch
    pub timestamp: i64,
    /// Parse failure, if the line was unusable
    pub error: Option<String>,
}

impl Record {
    /// Create a well-formed record
    pub fn new(key: impl Into<String>, size: u64, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            size,
            timestamp,
            error: None,
        }
    }

    /// True if the record failed to parse and must be skipped
    pub fn is_skippable(&self) -> bool {
        self.error.is_some()
    }
}
