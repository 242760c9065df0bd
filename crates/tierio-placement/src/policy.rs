//! Placement policy trait and factory

use crate::minimize::MinimizeIoTime;
use crate::rotate::{Random, RoundRobin};
use crate::schema::{PlacementSchema, SubPlacement, TargetSnapshot};
use tierio_common::{Error, PlacementPolicyKind, Result};

/// Context for one placement decision
#[derive(Clone, Copy, Debug)]
pub struct PlacementContext {
    /// Blob score in `[0, 1]`; higher means keep closer to the fast tiers
    pub score: f32,
}

impl Default for PlacementContext {
    fn default() -> Self {
        Self { score: 1.0 }
    }
}

/// A data placement policy.
///
/// Implementations are pure with respect to the snapshot: they never touch
/// live target state, only order and size sub-placements.
pub trait PlacementPolicy: Send + Sync {
    /// Produce one schema per requested size
    fn placement(
        &self,
        sizes: &[u64],
        targets: &[TargetSnapshot],
        ctx: &PlacementContext,
    ) -> Result<Vec<PlacementSchema>>;
}

/// Select the policy implementation for a configured kind
#[must_use]
pub fn policy_for(kind: PlacementPolicyKind) -> Box<dyn PlacementPolicy> {
    match kind {
        PlacementPolicyKind::MinimizeIoTime => Box::new(MinimizeIoTime),
        PlacementPolicyKind::RoundRobin => Box::new(RoundRobin::default()),
        PlacementPolicyKind::Random => Box::new(Random),
    }
}

/// Greedy fill over an ordered candidate list.
///
/// Takes `min(free, remaining)` from each candidate in order. Any remainder
/// after the last candidate is assigned to the final sub-placement so the
/// schema still sums to the request; the allocation loop will come up short
/// there and spill into the engine's fallback.
pub(crate) fn greedy_fill(size: u64, candidates: &[TargetSnapshot]) -> Result<PlacementSchema> {
    if candidates.is_empty() {
        return Err(Error::NoTargetsAvailable);
    }
    let mut placements = Vec::new();
    let mut remaining = size;
    for snap in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(snap.free);
        if take == 0 {
            continue;
        }
        placements.push(SubPlacement::new(snap.id, take));
        remaining -= take;
    }
    if remaining > 0 {
        match placements.last_mut() {
            Some(last) => last.size += remaining,
            // Every candidate reported zero free space; over-ask the first
            // so the schema sums and spillover resolves it.
            None => placements.push(SubPlacement::new(candidates[0].id, remaining)),
        }
    }
    Ok(PlacementSchema { placements })
}
