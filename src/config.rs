//! Simulator configuration file
//!
//! A JSON document with optional `proxy` and `replay` sections; missing
//! fields fall back to their defaults.
//!
//! ```json
//! { "proxy": { "initial_nodes": 32 }, "replay": { "data_chunks": 10, "parity_chunks": 2 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::proxy::ProxyConfig;
use crate::replay::ReplayConfig;

/// Complete simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub proxy: ProxyConfig,
    pub replay: ReplayConfig,
}

impl SimulatorConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parse from a JSON string
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject layouts that cannot be replayed
    pub fn validate(&self) -> Result<()> {
        if self.replay.data_chunks == 0 {
            return Err(Error::Config("data_chunks must be at least 1".to_string()));
        }
        if self.replay.total_chunks() > self.proxy.initial_nodes {
            return Err(Error::Config(format!(
                "{}+{} chunks do not fit on {} nodes",
                self.replay.data_chunks, self.replay.parity_chunks, self.proxy.initial_nodes
            )));
        }
        if self.proxy.node_capacity == 0 {
            return Err(Error::Config("node_capacity must be positive".to_string()));
        }
        if self.proxy.node_overhead > self.proxy.node_capacity {
            return Err(Error::Config(
                "node overhead exceeds node capacity".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config =
            SimulatorConfig::from_json(r#"{"proxy": {"initial_nodes": 32}, "replay": {"data_chunks": 10}}"#)
                .unwrap();
        assert_eq!(config.proxy.initial_nodes, 32);
        assert_eq!(config.replay.data_chunks, 10);
        assert_eq!(config.replay.parity_chunks, ReplayConfig::default().parity_chunks);
    }

    #[test]
    fn test_rejects_oversized_layout() {
        let err = SimulatorConfig::from_json(
            r#"{"proxy": {"initial_nodes": 4}, "replay": {"data_chunks": 4, "parity_chunks": 2}}"#,
        )
        .unwrap_err();
        assert_matches!(err, Error::Config(_));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = SimulatorConfig::from_json(
            r#"{"proxy": {"node_capacity": 0, "node_overhead": 0}}"#,
        )
        .unwrap_err();
        assert_matches!(err, Error::Config(_));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert_matches!(
            SimulatorConfig::from_json("{not json"),
            Err(Error::Json(_))
        );
    }

    #[test]
    fn test_missing_file() {
        assert_matches!(
            SimulatorConfig::from_file("/nonexistent/sionsim.json"),
            Err(Error::Config(_))
        );
    }
}
