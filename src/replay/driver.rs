//! Replay Driver
//!
//! Replays records against a shared proxy with bounded concurrency. Requests
//! for the same key serialise on the placement coordinator; everything else
//! runs in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::report::{Outcome, ReplayReport, FAILED_LABEL};
use super::ReplayConfig;
use crate::cluster::{Node, Object};
use crate::error::{Error, Result};
use crate::metrics::ReplayMetrics;
use crate::placement::{PlacementLookup, Placements};
use crate::proxy::Proxy;
use crate::storage::{timed_get, timed_set, Payload, StorageAdapter};
use crate::trace::Record;

/// Trace replay driver
pub struct Replayer {
    proxy: Arc<Proxy>,
    config: ReplayConfig,
    /// Slots available to an object (node count at creation)
    width: usize,
    storage: Option<Arc<dyn StorageAdapter>>,
    metrics: ReplayMetrics,
}

impl Replayer {
    /// Create a driver; fails if an object would not fit on distinct slots
    pub fn new(proxy: Arc<Proxy>, config: ReplayConfig) -> Result<Self> {
        if config.data_chunks == 0 {
            return Err(Error::Config("data_chunks must be at least 1".to_string()));
        }
        if config.max_concurrency == 0 {
            return Err(Error::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let width = proxy.len();
        if config.total_chunks() > width {
            return Err(Error::Config(format!(
                "{} chunks per object need at least as many nodes, have {}",
                config.total_chunks(),
                width
            )));
        }

        let metrics = ReplayMetrics::new()?;
        metrics.set_nodes(width);

        Ok(Self {
            proxy,
            config,
            width,
            storage: None,
            metrics,
        })
    }

    /// Read misses through to `storage`
    pub fn with_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn proxy(&self) -> &Arc<Proxy> {
        &self.proxy
    }

    pub fn metrics(&self) -> &ReplayMetrics {
        &self.metrics
    }

    /// Replay `records` to the end
    ///
    /// A reader error stops the run and is returned; a failed request is
    /// logged, counted and the run goes on.
    pub async fn replay<I>(&self, records: I) -> Result<ReplayReport>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        info!(
            "Replaying with {}+{} chunks, concurrency {}",
            self.config.data_chunks, self.config.parity_chunks, self.config.max_concurrency
        );

        let results = stream::iter(records)
            .map(|record| async move {
                let record = record?;
                Ok::<_, Error>(self.process(record).await)
            })
            .buffer_unordered(self.config.max_concurrency);
        futures::pin_mut!(results);

        while let Some(result) = results.next().await {
            match result? {
                Ok(outcome) => self.metrics.record_request(outcome.label()),
                Err(e) => {
                    warn!("Request failed: {}", e);
                    self.metrics.record_request(FAILED_LABEL);
                }
            }
        }

        Ok(self.report())
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> ReplayReport {
        let count = |outcome: Outcome| self.metrics.requests(outcome.label());
        let hits = count(Outcome::Hit);
        let cold_misses = count(Outcome::ColdMiss);
        let eviction_misses = count(Outcome::EvictionMiss);
        let skipped = count(Outcome::Skipped);
        let failed = self.metrics.requests(FAILED_LABEL);

        self.metrics.set_nodes(self.proxy.len());

        ReplayReport {
            proxy: self.proxy.id().to_string(),
            balancer: self.proxy.balancer_name().to_string(),
            requests: hits + cold_misses + eviction_misses + skipped + failed,
            hits,
            cold_misses,
            eviction_misses,
            skipped,
            failed,
            evicted_chunks: self.proxy.ledger().len() as u64,
            evicted_keys: self.proxy.num_evicts() as u64,
            blocks_migrated: self.proxy.blocks_migrated(),
            nodes: self.proxy.len() as u64,
            active_minutes: self.proxy.active_minutes(),
            balancer_cost_us: u64::try_from(self.proxy.balancer_cost().as_micros())
                .unwrap_or(u64::MAX),
            storage: self.storage.as_ref().map(|s| s.stats()),
        }
    }

    /// Serve one request
    #[instrument(skip(self, record), fields(req_id = %Uuid::new_v4(), key = %record.key))]
    pub async fn process(&self, record: Record) -> Result<Outcome> {
        let object = Object::new(record, self.config.data_chunks, self.config.parity_chunks)
            .with_bandwidth(self.config.bandwidth);

        if object.is_skippable() {
            debug!("Skipping unparsable record");
            return Ok(Outcome::Skipped);
        }
        if self.config.max_payload_bytes > 0 && object.size() > self.config.max_payload_bytes {
            debug!("Skipping oversized object ({} bytes)", object.size());
            return Ok(Outcome::Skipped);
        }
        if !self.proxy.validate(&object) {
            debug!("Object rejected by balancer");
            return Ok(Outcome::Skipped);
        }

        let outcome = loop {
            match self.proxy.placements(object.key()).await {
                PlacementLookup::Vacant => break self.resolve(&object, false)?,
                PlacementLookup::Reclaimed => break self.resolve(&object, true)?,
                // The cell we waited on was cleared; claim a fresh one
                PlacementLookup::Cleared => continue,
                PlacementLookup::Resolved(placements) => {
                    break self.serve(&object, &placements)?
                }
            }
        };

        if outcome.is_miss() {
            self.read_through(&object).await?;
        }
        debug!("{:?}", outcome);
        Ok(outcome)
    }

    /// Place an object whose pending cell this task owns
    fn resolve(&self, object: &Object, reclaimed: bool) -> Result<Outcome> {
        let key = object.key();
        let stored = self.place(object, reclaimed).and_then(|nodes| {
            if !reclaimed {
                return self.proxy.set_placements(key, nodes);
            }
            match self.proxy.reset_placements(key, nodes.clone()) {
                Err(Error::PlacementsUnset { .. }) => self.proxy.set_placements(key, nodes),
                other => other,
            }
        });

        if let Err(e) = stored {
            // Waiters must not block on a cell nobody will resolve
            self.proxy.clear_placements(key);
            return Err(e);
        }

        if reclaimed && self.proxy.ledger().contains(key) {
            Ok(Outcome::EvictionMiss)
        } else {
            Ok(Outcome::ColdMiss)
        }
    }

    /// Serve an object with resolved placements, re-placing it on a miss
    fn serve(&self, object: &Object, placements: &Placements) -> Result<Outcome> {
        let resident = placements
            .iter()
            .enumerate()
            .filter(|&(i, &index)| {
                self.proxy
                    .node(index)
                    .and_then(|node| node.touch_chunk(&object.chunk_key(i)))
                    .is_some()
            })
            .count();

        if resident >= object.data_chunks {
            return Ok(Outcome::Hit);
        }

        let outcome = if self.proxy.ledger().contains(object.key()) {
            Outcome::EvictionMiss
        } else {
            Outcome::ColdMiss
        };
        debug!(
            "{} of {} chunks resident, re-placing",
            resident,
            object.total_chunks()
        );

        for (i, &index) in placements.iter().enumerate() {
            if let Some(node) = self.proxy.node(index) {
                node.remove_chunk(&object.chunk_key(i));
            }
        }
        let nodes = self.place(object, true)?;
        self.proxy.reset_placements(object.key(), nodes)?;
        Ok(outcome)
    }

    /// Store every chunk of `object` and return the nodes holding them
    fn place(&self, object: &Object, replaced: bool) -> Result<Vec<u64>> {
        let slots = self.slots(object);
        let nodes = self.proxy.remap(&slots, object)?;

        let mut evicted = 0;
        let mut migrated = 0;
        for (i, &index) in nodes.iter().enumerate() {
            let node = self.proxy.ensure_node(index)?;
            node.activate(object.timestamp());

            let mut chunk = object.chunk(i);
            if replaced {
                chunk = chunk.replaced();
            }
            node.add_chunk(chunk.clone());

            evicted += self.relieve(node, &chunk.key);
            migrated += self.proxy.adapt(index, &chunk)?;
        }

        self.metrics.record_evictions(evicted);
        self.metrics.record_migrations(migrated);
        Ok(nodes)
    }

    /// Consecutive slots starting at the key's hash
    fn slots(&self, object: &Object) -> Vec<u64> {
        let mut hasher = DefaultHasher::new();
        object.key().hash(&mut hasher);
        let width = self.width as u64;
        let base = hasher.finish() % width;

        (0..object.total_chunks() as u64)
            .map(|i| (base + i) % width)
            .collect()
    }

    /// Evict least-frequently used chunks until `node` fits its capacity,
    /// keeping `keep`
    fn relieve(&self, node: &Node, keep: &str) -> usize {
        if node.memory_used() <= node.capacity() {
            return 0;
        }

        let mut victims: Vec<_> = node.chunks().filter(|(key, _)| key != keep).collect();
        victims.sort_by(|(ka, a), (kb, b)| a.freq.cmp(&b.freq).then_with(|| ka.cmp(kb)));

        let mut evicted = 0;
        for (chunk_key, _) in victims {
            if node.memory_used() <= node.capacity() {
                break;
            }
            if let Some(chunk) = node.remove_chunk(&chunk_key) {
                let object_key = chunk_key
                    .split_once('@')
                    .map_or(chunk_key.as_str(), |(_, key)| key);
                self.proxy.evict(object_key, chunk);
                evicted += 1;
            }
        }
        evicted
    }

    async fn read_through(&self, object: &Object) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let (result, op) = timed_get(&**storage, object.key()).await;
        self.metrics.record_storage_op(&op);
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                let size = usize::try_from(object.size()).unwrap_or(usize::MAX);
                let (result, op) =
                    timed_set(&**storage, object.key(), Payload::Sized(size)).await;
                self.metrics.record_storage_op(&op);
                result
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Replayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replayer")
            .field("proxy", &self.proxy.id())
            .field("config", &self.config)
            .field("storage", &self.storage.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
