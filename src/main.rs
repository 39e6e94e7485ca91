//! sionsim
//!
//! Replays a blob access trace against a simulated elastic function cache.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            sionsim                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Trace     │───▶│   Replayer   │───▶│    Proxy     │       │
//! │  │   (Azure)    │    │              │    │  + Balancer  │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │                             ▼                                   │
//! │                      ┌──────────────┐                           │
//! │                      │   Storage    │                           │
//! │                      └──────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sionsim::error::Error;
use sionsim::storage::DEFAULT_MISS_RATIO;
use sionsim::{
    AzureFunctionsReader, Balancer, DummyKind, DummyStore, InMemoryStore, PassthroughBalancer,
    Proxy, Replayer, Result, SimulatorConfig, StorageAdapter, WeightedBalancer,
};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BalancerKind {
    /// Virtual-block table with pressure-driven migration
    Weighted,
    /// Use slots as node indices
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// No backing store
    None,
    /// In-memory object store
    Memory,
    /// Dummy store (sizes only)
    DummyStore,
    /// Dummy cache that misses a share of reads
    DummyCache,
}

/// sionsim - Trace-driven placement simulator for elastic function caches
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Azure Functions blob trace (CSV)
    trace: PathBuf,

    /// JSON configuration file
    #[arg(long, env = "SIONSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Initial number of function nodes
    #[arg(long, env = "SIONSIM_NODES")]
    nodes: Option<usize>,

    /// Data chunks per object
    #[arg(long, env = "SIONSIM_DATA_CHUNKS")]
    data_chunks: Option<usize>,

    /// Parity chunks per object
    #[arg(long, env = "SIONSIM_PARITY_CHUNKS")]
    parity_chunks: Option<usize>,

    /// Requests in flight at once
    #[arg(long, env = "SIONSIM_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Placement strategy
    #[arg(long, value_enum, default_value = "weighted")]
    balancer: BalancerKind,

    /// Reject resets of placements that were never resolved
    #[arg(long)]
    strict_reset: bool,

    /// Backing store for misses
    #[arg(long, value_enum, default_value = "none")]
    store: StoreKind,

    /// Dummy cache miss ratio in percent
    #[arg(long, default_value_t = DEFAULT_MISS_RATIO)]
    miss_ratio: u32,

    /// Simulated bandwidth in bytes/second (0 = unlimited)
    #[arg(long, env = "SIONSIM_BANDWIDTH")]
    bandwidth: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    report_json: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// File configuration with command-line overrides applied
    fn simulator_config(&self) -> Result<SimulatorConfig> {
        let mut config = match &self.config {
            Some(path) => SimulatorConfig::from_file(path)?,
            None => SimulatorConfig::default(),
        };

        if let Some(nodes) = self.nodes {
            config.proxy.initial_nodes = nodes;
        }
        if let Some(data) = self.data_chunks {
            config.replay.data_chunks = data;
        }
        if let Some(parity) = self.parity_chunks {
            config.replay.parity_chunks = parity;
        }
        if let Some(concurrency) = self.concurrency {
            config.replay.max_concurrency = concurrency;
        }
        if let Some(bandwidth) = self.bandwidth {
            config.replay.bandwidth = bandwidth;
        }
        config.proxy.strict_reset |= self.strict_reset;

        config.validate()?;
        Ok(config)
    }

    fn balancer(&self) -> Box<dyn Balancer> {
        match self.balancer {
            BalancerKind::Weighted => Box::new(WeightedBalancer::new()),
            BalancerKind::Passthrough => Box::new(PassthroughBalancer::new()),
        }
    }

    fn storage(&self, bandwidth: u64) -> Option<Arc<dyn StorageAdapter>> {
        match self.store {
            StoreKind::None => None,
            StoreKind::Memory => Some(Arc::new(InMemoryStore::new())),
            StoreKind::DummyStore => Some(Arc::new(DummyStore::new(bandwidth, DummyKind::Store))),
            StoreKind::DummyCache => Some(Arc::new(DummyStore::new(
                bandwidth,
                DummyKind::Cache {
                    miss_ratio: self.miss_ratio,
                },
            ))),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.simulator_config()?;

    info!("Starting sionsim");
    info!("  Trace: {}", args.trace.display());
    info!("  Nodes: {}", config.proxy.initial_nodes);
    info!(
        "  Chunks: {}+{}",
        config.replay.data_chunks, config.replay.parity_chunks
    );
    info!("  Balancer: {:?}", args.balancer);
    info!("  Store: {:?}", args.store);

    let file = File::open(&args.trace).map_err(|e| {
        error!("Failed to open trace {}: {}", args.trace.display(), e);
        Error::Io(e)
    })?;
    let reader = AzureFunctionsReader::new(BufReader::new(file));

    let proxy = Arc::new(Proxy::new("proxy-0", &config.proxy, args.balancer())?);
    let mut replayer = Replayer::new(Arc::clone(&proxy), config.replay.clone())?;
    if let Some(storage) = args.storage(config.replay.bandwidth) {
        replayer = replayer.with_storage(storage);
    }

    let report = replayer.replay(reader).await?;
    proxy.close();

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if args.metrics {
        print!("{}", replayer.metrics().encode_text()?);
    }

    info!("Replay complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so the report on stdout stays parseable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
