//! Target registry
//!
//! In-memory table of the node's buffering targets with live capacity and
//! health. Targets are ordered fastest tier first; the last entry is the
//! placement fallback. Free capacity is charged on allocation and credited
//! on free; a periodic refresh re-syncs the cached stats from each client
//! and marks targets that fail to answer as unhealthy.

use crate::Target;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tierio_common::{Error, Result, TargetId, TargetStats};
use tracing::{info, warn};

/// One registered target plus its cached live state
pub struct TargetEntry {
    /// Target identifier
    pub id: TargetId,
    /// Device name
    pub name: String,
    /// The target client
    pub client: Arc<dyn Target>,
    /// Relative speed in `[0, 1]` (1 = fastest registered tier)
    pub score: f32,
    stats: RwLock<TargetStats>,
    healthy: AtomicBool,
}

impl TargetEntry {
    /// Cached statistics from the last poll, adjusted by charges/credits
    #[must_use]
    pub fn stats(&self) -> TargetStats {
        *self.stats.read()
    }

    /// Whether the last stats poll succeeded
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Deduct allocated bytes from the cached free capacity
    pub fn charge(&self, bytes: u64) {
        let mut stats = self.stats.write();
        stats.free = stats.free.saturating_sub(bytes);
    }

    /// Return freed bytes to the cached free capacity
    pub fn credit(&self, bytes: u64) {
        let mut stats = self.stats.write();
        stats.free = (stats.free + bytes).min(stats.max_cap);
    }

    /// Re-poll the client, updating stats and health
    pub async fn refresh(&self) {
        match self.client.poll_stats().await {
            Ok(stats) => {
                *self.stats.write() = stats;
                self.healthy.store(true, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(device = %self.id, %err, "stats poll failed; marking target unhealthy");
                self.healthy.store(false, Ordering::Relaxed);
            }
        }
    }
}

/// Ordered table of a node's targets
pub struct TargetRegistry {
    targets: Vec<Arc<TargetEntry>>,
    by_id: HashMap<TargetId, Arc<TargetEntry>>,
}

impl TargetRegistry {
    /// Register `clients` in tier order (fastest first) and take the
    /// initial stats poll from each. The last client becomes the fallback.
    pub async fn new(clients: Vec<Arc<dyn Target>>) -> Result<Self> {
        if clients.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one buffering target is required".to_string(),
            ));
        }

        let mut polled = Vec::with_capacity(clients.len());
        for client in clients {
            let stats = client.poll_stats().await.map_err(|err| Error::TargetUnavailable {
                target: client.id(),
                reason: err.to_string(),
            })?;
            polled.push((client, stats));
        }

        let max_bw = polled
            .iter()
            .map(|(_, s)| s.write_bw)
            .fold(f32::MIN, f32::max)
            .max(1.0);

        let mut targets = Vec::with_capacity(polled.len());
        let mut by_id = HashMap::with_capacity(polled.len());
        for (client, stats) in polled {
            let entry = Arc::new(TargetEntry {
                id: client.id(),
                name: client.name().to_string(),
                score: stats.write_bw / max_bw,
                stats: RwLock::new(stats),
                healthy: AtomicBool::new(true),
                client,
            });
            info!(device = %entry.id, name = %entry.name, free = stats.free,
                score = entry.score, "registered target");
            by_id.insert(entry.id, Arc::clone(&entry));
            targets.push(entry);
        }

        Ok(Self { targets, by_id })
    }

    /// Look up a target by id
    #[must_use]
    pub fn get(&self, id: &TargetId) -> Option<&Arc<TargetEntry>> {
        self.by_id.get(id)
    }

    /// The designated spillover fallback (last registered tier)
    #[must_use]
    pub fn fallback(&self) -> &Arc<TargetEntry> {
        self.targets.last().expect("registry is never empty")
    }

    /// All targets in tier order
    #[must_use]
    pub fn entries(&self) -> &[Arc<TargetEntry>] {
        &self.targets
    }

    /// Number of registered targets
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the registry is empty (never true after construction)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Re-poll every target's stats
    pub async fn refresh(&self) {
        for entry in &self.targets {
            entry.refresh().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTarget;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tierio_common::TargetConfig;

    struct FailingTarget(TargetId);

    #[async_trait]
    impl Target for FailingTarget {
        fn id(&self) -> TargetId {
            self.0
        }
        fn name(&self) -> &str {
            "broken"
        }
        async fn allocate(&self, _size: u64) -> Result<Vec<crate::Block>> {
            Ok(Vec::new())
        }
        async fn write(&self, _offset: u64, _data: Bytes) -> Result<usize> {
            Err(Error::TargetUnavailable {
                target: self.0,
                reason: "down".to_string(),
            })
        }
        async fn read(&self, _offset: u64, _len: u64) -> Result<Bytes> {
            Err(Error::TargetUnavailable {
                target: self.0,
                reason: "down".to_string(),
            })
        }
        async fn free(&self, _block: &crate::Block) -> Result<()> {
            Ok(())
        }
        async fn poll_stats(&self) -> Result<TargetStats> {
            Err(Error::TargetUnavailable {
                target: self.0,
                reason: "down".to_string(),
            })
        }
    }

    fn mem(index: u32, capacity: u64, bw: f32) -> Arc<dyn Target> {
        Arc::new(MemoryTarget::new(
            TargetId::new(1, index),
            &TargetConfig {
                name: format!("ram{index}"),
                capacity,
                bandwidth_mbps: bw,
                ..TargetConfig::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_scores_normalized() {
        let registry = TargetRegistry::new(vec![mem(0, 64, 6000.0), mem(1, 1024, 300.0)])
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!((registry.entries()[0].score - 1.0).abs() < f32::EPSILON);
        assert!((registry.entries()[1].score - 0.05).abs() < 0.001);
        assert_eq!(registry.fallback().id, TargetId::new(1, 1));
    }

    #[tokio::test]
    async fn test_charge_credit() {
        let registry = TargetRegistry::new(vec![mem(0, 128, 1000.0)]).await.unwrap();
        let entry = registry.fallback();
        entry.charge(100);
        assert_eq!(entry.stats().free, 28);
        entry.credit(100);
        assert_eq!(entry.stats().free, 128);
        entry.credit(10_000);
        assert_eq!(entry.stats().free, 128);
    }

    #[tokio::test]
    async fn test_unhealthy_after_failed_refresh() {
        let registry = TargetRegistry::new(vec![mem(0, 128, 1000.0)]).await.unwrap();
        let entry = Arc::clone(&registry.entries()[0]);
        assert!(entry.healthy());

        let broken = TargetEntry {
            id: TargetId::new(1, 9),
            name: "broken".to_string(),
            client: Arc::new(FailingTarget(TargetId::new(1, 9))),
            score: 0.1,
            stats: RwLock::new(TargetStats::default()),
            healthy: AtomicBool::new(true),
        };
        broken.refresh().await;
        assert!(!broken.healthy());
    }

    #[tokio::test]
    async fn test_empty_registry_rejected() {
        assert!(TargetRegistry::new(Vec::new()).await.is_err());
    }
}
