//! Engine assembly
//!
//! One [`Engine`] value per node, constructed at startup and passed by
//! reference; there are no hidden globals. The engine owns the lanes, the
//! target registry, the placement policy, the access-pattern ring, and the
//! global id allocator.

use crate::iolog::AccessPatternLog;
use crate::lane::Lane;
use crate::router::{DomainQuery, Router};
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tierio_common::{
    BlobId, BlobMetadata, EngineConfig, Error, IoStat, Result, TagId, TagMetadata, TargetMetadata,
};
use tierio_placement::{policy_for, PlacementPolicy, TargetSnapshot};
use tierio_target::{build_target, Target, TargetRegistry};
use tracing::info;

/// The per-node metadata and data-placement engine
pub struct Engine {
    node_id: u32,
    flush_period: Duration,
    pub(crate) lanes: Vec<Lane>,
    pub(crate) router: Router,
    pub(crate) registry: TargetRegistry,
    pub(crate) policy: Box<dyn PlacementPolicy>,
    pub(crate) io_log: AccessPatternLog,
    id_alloc: AtomicU64,
    draining: AtomicBool,
    pending_flushes: AtomicU64,
}

impl Engine {
    /// Build an engine from its configuration, constructing one target
    /// client per configured device.
    pub async fn new(config: EngineConfig) -> Result<Arc<Self>> {
        let mut clients: Vec<Arc<dyn Target>> = Vec::with_capacity(config.targets.len());
        for (index, target_config) in config.targets.iter().enumerate() {
            clients.push(build_target(config.node_id, index as u32, target_config)?);
        }
        Self::with_targets(config, clients).await
    }

    /// Build an engine over already-constructed target clients, ordered
    /// fastest tier first. The last client is the placement fallback.
    pub async fn with_targets(
        config: EngineConfig,
        clients: Vec<Arc<dyn Target>>,
    ) -> Result<Arc<Self>> {
        if config.node_id == 0 {
            return Err(Error::InvalidConfig(
                "node_id 0 is reserved for null ids".to_string(),
            ));
        }
        if config.lane_count == 0 {
            return Err(Error::InvalidConfig("lane_count must be non-zero".to_string()));
        }

        let registry = TargetRegistry::new(clients).await?;
        info!(
            node_id = config.node_id,
            lanes = config.lane_count,
            targets = registry.len(),
            "engine starting"
        );

        Ok(Arc::new(Self {
            node_id: config.node_id,
            flush_period: config.flush_period,
            lanes: (0..config.lane_count).map(|_| Lane::new()).collect(),
            router: Router::new(config.lane_count),
            registry,
            policy: policy_for(config.placement.policy),
            io_log: AccessPatternLog::new(config.io_log_depth),
            id_alloc: AtomicU64::new(1),
            draining: AtomicBool::new(false),
            pending_flushes: AtomicU64::new(0),
        }))
    }

    /// This node's id
    #[must_use]
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Configured flush period
    #[must_use]
    pub fn flush_period(&self) -> Duration {
        self.flush_period
    }

    /// The target registry
    #[must_use]
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// The request router
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Allocate a node-unique id component
    pub(crate) fn next_unique(&self) -> u64 {
        self.id_alloc.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolve the lane owning a tag operation
    pub(crate) async fn tag_lane(&self, name: Option<&str>, id: TagId) -> &Lane {
        let hashed = self.router.lane_of(self.router.tag_route(name, &id));
        let hit = self.lanes[hashed].owns_tag(name, id).await;
        let (lane, _) = self.router.resolve(DomainQuery::Route, hashed, hit);
        &self.lanes[lane]
    }

    /// Resolve the lane owning a blob operation
    pub(crate) async fn blob_lane(
        &self,
        tag_id: TagId,
        name: Option<&str>,
        id: Option<BlobId>,
    ) -> &Lane {
        let hashed = self
            .router
            .lane_of(self.router.blob_route(&tag_id, name, id.as_ref()));
        let hit = self.lanes[hashed].owns_blob(tag_id, name, id).await;
        let (lane, _) = self.router.resolve(DomainQuery::Route, hashed, hit);
        &self.lanes[lane]
    }

    /// Point-in-time target view for the placement engine
    pub(crate) fn target_snapshots(&self) -> Vec<TargetSnapshot> {
        self.registry
            .entries()
            .iter()
            .map(|entry| {
                let stats = entry.stats();
                TargetSnapshot {
                    id: entry.id,
                    free: stats.free,
                    bandwidth: stats.write_bw,
                    latency: stats.write_latency,
                    healthy: entry.healthy(),
                }
            })
            .collect()
    }

    /// Access-pattern records with `id > since_id`, ascending by id
    #[must_use]
    pub fn poll_access_pattern(&self, since_id: u64) -> Vec<IoStat> {
        self.io_log.poll(since_id)
    }

    /// Snapshot every blob's metadata, optionally filtered by a name regex
    pub async fn poll_blob_metadata(&self, filter: Option<&str>) -> Result<Vec<BlobMetadata>> {
        let filter = compile_filter(filter)?;
        let mut out = Vec::new();
        for lane in &self.lanes {
            let maps = lane.blobs.read().await;
            for blob in maps.blobs.values() {
                if let Some(re) = &filter {
                    if !re.is_match(&blob.name) {
                        continue;
                    }
                }
                let state = blob.state.read().await;
                out.push(BlobMetadata {
                    blob_id: blob.id,
                    tag_id: blob.tag_id,
                    name: blob.name.clone(),
                    blob_size: state.blob_size,
                    max_blob_size: state.max_blob_size,
                    score: state.score,
                    user_score: state.user_score,
                    mod_count: blob.mod_count.load(Ordering::Relaxed),
                    last_flush: blob.last_flush.load(Ordering::Relaxed),
                    access_freq: blob.access_freq.load(Ordering::Relaxed),
                    buffers: state.buffers.clone(),
                });
            }
        }
        Ok(out)
    }

    /// Snapshot every tag's metadata, optionally filtered by a name regex
    pub async fn poll_tag_metadata(&self, filter: Option<&str>) -> Result<Vec<TagMetadata>> {
        let filter = compile_filter(filter)?;
        let mut out = Vec::new();
        for lane in &self.lanes {
            let maps = lane.tags.read().await;
            for tag in maps.tags.values() {
                if let Some(re) = &filter {
                    if !re.is_match(&tag.name) {
                        continue;
                    }
                }
                let state = tag.state.read().await;
                out.push(TagMetadata {
                    tag_id: tag.id,
                    name: tag.name.clone(),
                    owner: tag.owner,
                    internal_size: state.internal_size,
                    flags: tag.flags,
                    blob_count: state.blobs.len(),
                });
            }
        }
        Ok(out)
    }

    /// Snapshot every target's live state
    pub async fn poll_target_metadata(&self) -> Vec<TargetMetadata> {
        self.registry
            .entries()
            .iter()
            .map(|entry| TargetMetadata {
                target_id: entry.id,
                name: entry.name.clone(),
                stats: entry.stats(),
                score: entry.score,
                healthy: entry.healthy(),
            })
            .collect()
    }

    /// Signal a drain: the flush loop counts remaining dirty blobs into
    /// the pending counter so an orchestrator can tell when work remains.
    pub fn begin_drain(&self) {
        self.pending_flushes.store(0, Ordering::Relaxed);
        self.draining.store(true, Ordering::Relaxed);
    }

    /// Clear the drain signal
    pub fn end_drain(&self) {
        self.draining.store(false, Ordering::Relaxed);
    }

    /// Whether a drain is in progress
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Dirty blobs observed by flush sweeps since the drain began
    #[must_use]
    pub fn pending_flush_count(&self) -> u64 {
        self.pending_flushes.load(Ordering::Relaxed)
    }

    pub(crate) fn note_pending_flush(&self) {
        if self.is_draining() {
            self.pending_flushes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn compile_filter(filter: Option<&str>) -> Result<Option<Regex>> {
    filter
        .map(|f| Regex::new(f).map_err(|err| Error::InvalidConfig(format!("bad filter: {err}"))))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tierio_common::{PlacementConfig, TargetConfig, TargetKind};

    fn config(node_id: u32, lane_count: usize) -> EngineConfig {
        EngineConfig {
            node_id,
            lane_count,
            targets: vec![TargetConfig {
                name: "ram".to_string(),
                kind: TargetKind::Memory,
                mount_point: PathBuf::new(),
                capacity: 1024,
                bandwidth_mbps: 6000.0,
                latency_us: 15.0,
                slab_sizes: Vec::new(),
            }],
            placement: PlacementConfig::default(),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_null_node_id() {
        assert!(Engine::new(config(0, 4)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_zero_lanes() {
        assert!(Engine::new(config(1, 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_no_targets() {
        let mut cfg = config(1, 4);
        cfg.targets.clear();
        assert!(Engine::new(cfg).await.is_err());
    }

    #[tokio::test]
    async fn test_target_metadata_snapshot() {
        let engine = Engine::new(config(1, 4)).await.unwrap();
        let targets = engine.poll_target_metadata().await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].stats.free, 1024);
        assert!(targets[0].healthy);
    }
}
