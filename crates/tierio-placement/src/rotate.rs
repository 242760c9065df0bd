//! Rotating placement policies: round-robin and random start

use crate::policy::{greedy_fill, PlacementContext, PlacementPolicy};
use crate::schema::{PlacementSchema, TargetSnapshot};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use tierio_common::Result;

/// Rotate the starting target across calls, greedy fill from there.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl PlacementPolicy for RoundRobin {
    fn placement(
        &self,
        sizes: &[u64],
        targets: &[TargetSnapshot],
        _ctx: &PlacementContext,
    ) -> Result<Vec<PlacementSchema>> {
        let mut candidates: Vec<TargetSnapshot> =
            targets.iter().filter(|t| t.placeable()).copied().collect();
        if !candidates.is_empty() {
            let start = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
            candidates.rotate_left(start);
        }
        sizes
            .iter()
            .map(|&size| greedy_fill(size, &candidates))
            .collect()
    }
}

/// Pick a random starting target, greedy fill from there.
#[derive(Clone, Copy, Debug, Default)]
pub struct Random;

impl PlacementPolicy for Random {
    fn placement(
        &self,
        sizes: &[u64],
        targets: &[TargetSnapshot],
        _ctx: &PlacementContext,
    ) -> Result<Vec<PlacementSchema>> {
        let mut candidates: Vec<TargetSnapshot> =
            targets.iter().filter(|t| t.placeable()).copied().collect();
        if !candidates.is_empty() {
            let start = rand::thread_rng().gen_range(0..candidates.len());
            candidates.rotate_left(start);
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

    fn snaps(n: u32) -> Vec<TargetSnapshot> {
        (0..n)
            .map(|i| TargetSnapshot {
                id: TargetId::new(1, i),
                free: 1024,
                bandwidth: 1000.0,
                latency: 100.0,
                healthy: true,
            })
            .collect()
    }

    #[test]
    fn test_round_robin_rotates() {
        let targets = snaps(3);
        let policy = RoundRobin::default();
        let ctx = PlacementContext::default();
        let first = policy.placement(&[10], &targets, &ctx).unwrap();
        let second = policy.placement(&[10], &targets, &ctx).unwrap();
        let third = policy.placement(&[10], &targets, &ctx).unwrap();
        let starts: Vec<u32> = [first, second, third]
            .iter()
            .map(|s| s[0].placements[0].target_id.index)
            .collect();
        assert_eq!(starts, vec![0, 1, 2]);
    }

    #[test]
    fn test_random_sums_to_request() {
        let targets = snaps(4);
        let policy = Random;
        for _ in 0..16 {
            let schemas = policy
                .placement(&[100], &targets, &PlacementContext::default())
                .unwrap();
            assert_eq!(schemas[0].total(), 100);
        }
    }
}
