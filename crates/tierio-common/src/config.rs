//! Configuration types for TierIO
//!
//! These structures describe a node's buffering hierarchy and engine
//! parameters. Loading them from a config file is the host application's
//! concern; the engine consumes the structs directly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of lanes per node
pub const DEFAULT_LANE_COUNT: usize = 32;

/// Default flush-loop period
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(5);

/// Default access-pattern ring depth
pub const DEFAULT_IO_LOG_DEPTH: usize = 8192;

/// Root configuration for a TierIO node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Node identifier (must be non-zero; zero is reserved for null ids)
    pub node_id: u32,
    /// Number of metadata lanes
    pub lane_count: usize,
    /// Background flush period
    pub flush_period: Duration,
    /// Access-pattern ring depth
    pub io_log_depth: usize,
    /// Buffering targets, fastest tier first. The last target is the
    /// placement fallback.
    pub targets: Vec<TargetConfig>,
    /// Data placement configuration
    pub placement: PlacementConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            lane_count: DEFAULT_LANE_COUNT,
            flush_period: DEFAULT_FLUSH_PERIOD,
            io_log_depth: DEFAULT_IO_LOG_DEPTH,
            targets: Vec::new(),
            placement: PlacementConfig::default(),
        }
    }
}

/// Kind of storage backing a target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// DRAM-backed tier
    Memory,
    /// File-backed tier at a mount point
    File,
}

/// Configuration for a single buffering target
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Human-readable device name
    pub name: String,
    /// Backing kind
    pub kind: TargetKind,
    /// Mount point for file-backed targets (ignored for memory)
    pub mount_point: PathBuf,
    /// Capacity in bytes
    pub capacity: u64,
    /// Write bandwidth in MB/s, used for placement ordering
    pub bandwidth_mbps: f32,
    /// Write latency in microseconds
    pub latency_us: f32,
    /// Allocation slab sizes in bytes; allocations are split into blocks of
    /// at most the largest slab. Empty means unsplit.
    pub slab_sizes: Vec<u64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: "ram".to_string(),
            kind: TargetKind::Memory,
            mount_point: PathBuf::new(),
            capacity: 64 * 1024 * 1024,
            bandwidth_mbps: 6000.0,
            latency_us: 15.0,
            slab_sizes: Vec::new(),
        }
    }
}

/// Placement policy selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicyKind {
    /// Order targets by bandwidth, bias the starting tier by blob score
    #[default]
    MinimizeIoTime,
    /// Rotate the starting target across calls
    RoundRobin,
    /// Pick a random starting target
    Random,
}

/// Data placement configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Policy used by the placement engine
    pub policy: PlacementPolicyKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.lane_count, DEFAULT_LANE_COUNT);
        assert_eq!(config.flush_period, Duration::from_secs(5));
        assert_eq!(config.io_log_depth, 8192);
        assert_eq!(config.placement.policy, PlacementPolicyKind::MinimizeIoTime);
    }

    #[test]
    fn test_target_config_roundtrip() {
        let config = TargetConfig {
            name: "nvme0".to_string(),
            kind: TargetKind::File,
            mount_point: PathBuf::from("/mnt/nvme"),
            capacity: 1 << 30,
            bandwidth_mbps: 3000.0,
            latency_us: 80.0,
            slab_sizes: vec![4096, 65536],
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: TargetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, TargetKind::File);
        assert_eq!(back.capacity, 1 << 30);
        assert_eq!(back.slab_sizes, vec![4096, 65536]);
    }
}
