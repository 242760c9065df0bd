//! Bandwidth-ordered placement biased by blob score

use crate::policy::{greedy_fill, PlacementContext, PlacementPolicy};
use crate::schema::{PlacementSchema, TargetSnapshot};
use tierio_common::Result;
use tracing::debug;

/// Order targets fastest-first by write bandwidth and bias the starting tier
/// by the blob score: a score of 1.0 starts at the fastest tier, a score of
/// 0.0 at the slowest. Candidates wrap so all capacity stays reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct MinimizeIoTime;

impl PlacementPolicy for MinimizeIoTime {
    fn placement(
        &self,
        sizes: &[u64],
        targets: &[TargetSnapshot],
        ctx: &PlacementContext,
    ) -> Result<Vec<PlacementSchema>> {
        let mut candidates: Vec<TargetSnapshot> =
            targets.iter().filter(|t| t.placeable()).copied().collect();
        candidates.sort_by(|a, b| b.bandwidth.total_cmp(&a.bandwidth));

        if !candidates.is_empty() {
            let score = ctx.score.clamp(0.0, 1.0);
            let start = ((1.0 - score) * (candidates.len() - 1) as f32).round() as usize;
            candidates.rotate_left(start);
            debug!(
                score,
                start,
                candidates = candidates.len(),
                "minimize-io-time candidate order"
            );
        }

        sizes
            .iter()
            .map(|&size| greedy_fill(size, &candidates))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierio_common::TargetId;

    fn snap(index: u32, free: u64, bandwidth: f32) -> TargetSnapshot {
        TargetSnapshot {
            id: TargetId::new(1, index),
            free,
            bandwidth,
            latency: 100.0,
            healthy: true,
        }
    }

    #[test]
    fn test_high_score_prefers_fast_tier() {
        // Config order slow-first; policy must re-order by bandwidth.
        let targets = [snap(0, 1024, 70.0), snap(1, 1024, 6000.0)];
        let policy = MinimizeIoTime;
        let schemas = policy
            .placement(&[100], &targets, &PlacementContext { score: 1.0 })
            .unwrap();
        assert_eq!(schemas[0].placements[0].target_id, TargetId::new(1, 1));
        assert_eq!(schemas[0].total(), 100);
    }

    #[test]
    fn test_low_score_starts_at_slow_tier() {
        let targets = [snap(0, 1024, 6000.0), snap(1, 1024, 300.0), snap(2, 1024, 70.0)];
        let policy = MinimizeIoTime;
        let schemas = policy
            .placement(&[100], &targets, &PlacementContext { score: 0.0 })
            .unwrap();
        assert_eq!(schemas[0].placements[0].target_id, TargetId::new(1, 2));
    }

    #[test]
    fn test_unhealthy_targets_skipped() {
        let mut fast = snap(0, 1024, 6000.0);
        fast.healthy = false;
        let targets = [fast, snap(1, 1024, 300.0)];
        let policy = MinimizeIoTime;
        let schemas = policy
            .placement(&[100], &targets, &PlacementContext { score: 1.0 })
            .unwrap();
        assert_eq!(schemas[0].placements.len(), 1);
        assert_eq!(schemas[0].placements[0].target_id, TargetId::new(1, 1));
    }

    #[test]
    fn test_one_schema_per_size() {
        let targets = [snap(0, 4096, 6000.0)];
        let policy = MinimizeIoTime;
        let schemas = policy
            .placement(&[10, 20, 30], &targets, &PlacementContext::default())
            .unwrap();
        assert_eq!(schemas.len(), 3);
        assert_eq!(schemas[2].total(), 30);
    }
}
