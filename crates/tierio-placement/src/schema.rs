//! Placement schema types

use serde::{Deserialize, Serialize};
use tierio_common::TargetId;

/// A point-in-time view of one target, as the DPE sees it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetSnapshot {
    /// Target identifier
    pub id: TargetId,
    /// Free capacity in bytes
    pub free: u64,
    /// Write bandwidth in MB/s
    pub bandwidth: f32,
    /// Write latency in microseconds
    pub latency: f32,
    /// Whether the last stats poll succeeded
    pub healthy: bool,
}

impl TargetSnapshot {
    /// Whether this target may receive placements
    #[must_use]
    pub fn placeable(&self) -> bool {
        self.healthy && self.free > 0
    }
}

/// A sub-allocation on one target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPlacement {
    /// Target receiving the bytes
    pub target_id: TargetId,
    /// Number of bytes to allocate there
    pub size: u64,
}

impl SubPlacement {
    /// Create a new sub-placement
    #[must_use]
    pub const fn new(target_id: TargetId, size: u64) -> Self {
        Self { target_id, size }
    }
}

/// The placement decision for one requested size: an ordered list of
/// sub-placements summing to the request. Spillover from sub-placement `i`
/// lands in sub-placement `i + 1`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementSchema {
    /// Ordered sub-placements
    pub placements: Vec<SubPlacement>,
}

impl PlacementSchema {
    /// Total bytes covered by the schema
    #[must_use]
    pub fn total(&self) -> u64 {
        self.placements.iter().map(|p| p.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_total() {
        let schema = PlacementSchema {
            placements: vec![
                SubPlacement::new(TargetId::new(1, 0), 64),
                SubPlacement::new(TargetId::new(1, 1), 192),
            ],
        };
        assert_eq!(schema.total(), 256);
    }

    #[test]
    fn test_placeable() {
        let mut snap = TargetSnapshot {
            id: TargetId::new(1, 0),
            free: 128,
            bandwidth: 6000.0,
            latency: 15.0,
            healthy: true,
        };
        assert!(snap.placeable());
        snap.free = 0;
        assert!(!snap.placeable());
        snap.free = 128;
        snap.healthy = false;
        assert!(!snap.placeable());
    }
}
