//! Identity balancer: placements are used as given.

use std::sync::Arc;

use super::Balancer;
use crate::cluster::{Chunk, NodePool, Object};
use crate::error::Result;

/// Balancer that leaves placements untouched and never migrates
#[derive(Debug, Default)]
pub struct PassthroughBalancer;

impl PassthroughBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl Balancer for PassthroughBalancer {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn bind(&mut self, _pool: Arc<NodePool>) {}

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn remap(&self, placements: &[u64], _object: &Object) -> Result<Vec<u64>> {
        Ok(placements.to_vec())
    }

    fn adapt(&self, _node_index: u64, _chunk: &Chunk) -> Result<usize> {
        Ok(0)
    }
}
