//! Metrics module
//!
//! Prometheus counters for a replay run, kept in a private registry so
//! several runs in one process do not collide.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::error::{Error, Result};
use crate::storage::{Command, OpRecord, ResultCode};

/// Replay counters
#[derive(Clone)]
pub struct ReplayMetrics {
    registry: Registry,
    requests: IntCounterVec,
    blocks_migrated: IntCounter,
    chunks_evicted: IntCounter,
    nodes: IntGauge,
    storage_ops: HistogramVec,
}

impl ReplayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("sionsim".to_string()), None)?;

        let requests = IntCounterVec::new(
            Opts::new("requests_total", "Replayed requests by outcome"),
            &["outcome"],
        )?;
        let blocks_migrated =
            IntCounter::new("blocks_migrated_total", "Blocks moved by the balancer")?;
        let chunks_evicted =
            IntCounter::new("chunks_evicted_total", "Chunks evicted under memory pressure")?;
        let nodes = IntGauge::new("nodes", "Function nodes in the pool")?;
        let storage_ops = HistogramVec::new(
            HistogramOpts::new(
                "storage_op_duration_seconds",
                "Backing store operation latency by command and result",
            )
            .buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["cmd", "result"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(blocks_migrated.clone()))?;
        registry.register(Box::new(chunks_evicted.clone()))?;
        registry.register(Box::new(nodes.clone()))?;
        registry.register(Box::new(storage_ops.clone()))?;

        Ok(Self {
            registry,
            requests,
            blocks_migrated,
            chunks_evicted,
            nodes,
            storage_ops,
        })
    }

    /// Count one request with its outcome label
    pub fn record_request(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    pub fn requests(&self, outcome: &str) -> u64 {
        self.requests.with_label_values(&[outcome]).get()
    }

    pub fn record_migrations(&self, blocks: usize) {
        self.blocks_migrated.inc_by(blocks as u64);
    }

    pub fn record_evictions(&self, chunks: usize) {
        self.chunks_evicted.inc_by(chunks as u64);
    }

    pub fn set_nodes(&self, nodes: usize) {
        self.nodes.set(i64::try_from(nodes).unwrap_or(i64::MAX));
    }

    /// Observe one backing store operation
    pub fn record_storage_op(&self, op: &OpRecord) {
        self.storage_ops
            .with_label_values(&[op.cmd.label(), op.result.label()])
            .observe(op.duration.as_secs_f64());
    }

    /// Store operations seen with `cmd` and `result`
    pub fn storage_ops(&self, cmd: Command, result: ResultCode) -> u64 {
        self.storage_ops
            .with_label_values(&[cmd.label(), result.label()])
            .get_sample_count()
    }

    /// Render the registry in the Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))
    }
}

impl std::fmt::Debug for ReplayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayMetrics")
            .field("blocks_migrated", &self.blocks_migrated.get())
            .field("chunks_evicted", &self.chunks_evicted.get())
            .field("nodes", &self.nodes.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ReplayMetrics::new().unwrap();
        metrics.record_request("hit");
        metrics.record_request("hit");
        metrics.record_request("cold_miss");
        metrics.record_migrations(3);
        metrics.set_nodes(4);

        assert_eq!(metrics.requests("hit"), 2);
        assert_eq!(metrics.requests("cold_miss"), 1);
        assert_eq!(metrics.requests("eviction_miss"), 0);
    }

    #[test]
    fn test_encode_text() {
        let metrics = ReplayMetrics::new().unwrap();
        metrics.record_request("hit");
        metrics.record_evictions(2);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("sionsim_requests_total{outcome=\"hit\"} 1"));
        assert!(text.contains("sionsim_chunks_evicted_total 2"));
    }

    #[test]
    fn test_storage_op_histogram() {
        let metrics = ReplayMetrics::new().unwrap();
        let op = OpRecord {
            cmd: Command::Get,
            req_id: uuid::Uuid::new_v4(),
            start_ns: 1,
            duration: std::time::Duration::from_millis(2),
            size: 0,
            result: ResultCode::NotFound,
            client: "dc".to_string(),
        };
        metrics.record_storage_op(&op);

        assert_eq!(metrics.storage_ops(Command::Get, ResultCode::NotFound), 1);
        assert_eq!(metrics.storage_ops(Command::Get, ResultCode::Success), 0);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains(
            "sionsim_storage_op_duration_seconds_count{cmd=\"get\",result=\"not_found\"} 1"
        ));
    }

    #[test]
    fn test_independent_registries() {
        let a = ReplayMetrics::new().unwrap();
        let b = ReplayMetrics::new().unwrap();
        a.record_request("hit");
        assert_eq!(b.requests("hit"), 0);
    }
}
