//! TierIO Target - storage target clients
//!
//! A *target* is one tier of the buffering hierarchy: a device proxy with
//! allocate/write/read/free/poll_stats. This crate provides:
//! - the `Target` trait and `Block` range type
//! - an extent allocator with partial allocation (enables tier spillover)
//! - memory- and file-backed target implementations
//! - the `TargetRegistry` tracking live capacity and health per target

pub mod alloc;
pub mod file;
pub mod memory;
pub mod registry;

pub use alloc::{Extent, ExtentAllocator};
pub use file::FileTarget;
pub use memory::MemoryTarget;
pub use registry::{TargetEntry, TargetRegistry};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tierio_common::{Result, TargetConfig, TargetId, TargetKind, TargetStats};

/// A contiguous byte range allocated on a target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    /// Byte offset on the target
    pub offset: u64,
    /// Length in bytes
    pub size: u64,
}

impl Block {
    /// Create a new block
    #[must_use]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

/// A storage target client.
///
/// Every method is a suspension point; callers must not hold
/// non-cooperative locks across these calls.
#[async_trait]
pub trait Target: Send + Sync {
    /// Target identifier
    fn id(&self) -> TargetId;

    /// Device name
    fn name(&self) -> &str;

    /// Allocate up to `size` bytes, returned as zero or more blocks.
    ///
    /// A short result (total below `size`) means the target is low on
    /// space; the caller spills the remainder to the next tier.
    async fn allocate(&self, size: u64) -> Result<Vec<Block>>;

    /// Write `data` at `offset`, returning the byte count written
    async fn write(&self, offset: u64, data: Bytes) -> Result<usize>;

    /// Read `len` bytes at `offset`
    async fn read(&self, offset: u64, len: u64) -> Result<Bytes>;

    /// Return a block's bytes to the free pool
    async fn free(&self, block: &Block) -> Result<()>;

    /// Poll live statistics
    async fn poll_stats(&self) -> Result<TargetStats>;
}

/// Build a target client from its configuration
pub fn build_target(node_id: u32, index: u32, config: &TargetConfig) -> Result<Arc<dyn Target>> {
    let id = TargetId::new(node_id, index);
    match config.kind {
        TargetKind::Memory => Ok(Arc::new(MemoryTarget::new(id, config))),
        TargetKind::File => Ok(Arc::new(FileTarget::create(id, config)?)),
    }
}
