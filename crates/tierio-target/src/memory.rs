//! DRAM-backed target

use crate::alloc::ExtentAllocator;
use crate::{Block, Target};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tierio_common::{Error, Result, TargetConfig, TargetId, TargetStats};

/// A memory tier: a preallocated byte arena plus an extent allocator.
///
/// Operations complete without suspending; the trait methods exist so the
/// engine treats every tier uniformly.
pub struct MemoryTarget {
    id: TargetId,
    name: String,
    data: RwLock<Vec<u8>>,
    alloc: Mutex<ExtentAllocator>,
    capacity: u64,
    bandwidth_mbps: f32,
    latency_us: f32,
}

impl MemoryTarget {
    /// Create a memory target from its configuration
    #[must_use]
    pub fn new(id: TargetId, config: &TargetConfig) -> Self {
        let max_block = config.slab_sizes.iter().copied().max().unwrap_or(0);
        Self {
            id,
            name: config.name.clone(),
            data: RwLock::new(vec![0u8; config.capacity as usize]),
            alloc: Mutex::new(ExtentAllocator::new(config.capacity, max_block)),
            capacity: config.capacity,
            bandwidth_mbps: config.bandwidth_mbps,
            latency_us: config.latency_us,
        }
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        if offset + len > self.capacity {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "range [{offset}, {}) exceeds capacity {}",
                    offset + len,
                    self.capacity
                ),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Target for MemoryTarget {
    fn id(&self) -> TargetId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn allocate(&self, size: u64) -> Result<Vec<Block>> {
        Ok(self.alloc.lock().allocate(size))
    }

    async fn write(&self, offset: u64, data: Bytes) -> Result<usize> {
        self.check_range(offset, data.len() as u64)?;
        let mut arena = self.data.write();
        arena[offset as usize..offset as usize + data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn read(&self, offset: u64, len: u64) -> Result<Bytes> {
        self.check_range(offset, len)?;
        let arena = self.data.read();
        Ok(Bytes::copy_from_slice(
            &arena[offset as usize..(offset + len) as usize],
        ))
    }

    async fn free(&self, block: &Block) -> Result<()> {
        self.alloc.lock().free(block);
        Ok(())
    }

    async fn poll_stats(&self) -> Result<TargetStats> {
        Ok(TargetStats {
            free: self.alloc.lock().free_bytes(),
            max_cap: self.capacity,
            write_bw: self.bandwidth_mbps,
            write_latency: self.latency_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(capacity: u64) -> MemoryTarget {
        MemoryTarget::new(
            TargetId::new(1, 0),
            &TargetConfig {
                capacity,
                ..TargetConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let t = target(1024);
        let blocks = t.allocate(11).await.unwrap();
        assert_eq!(blocks.len(), 1);
        let n = t
            .write(blocks[0].offset, Bytes::from_static(b"hello world"))
            .await
            .unwrap();
        assert_eq!(n, 11);
        let data = t.read(blocks[0].offset, 11).await.unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn test_free_restores_capacity() {
        let t = target(64);
        let blocks = t.allocate(64).await.unwrap();
        assert_eq!(t.poll_stats().await.unwrap().free, 0);
        t.free(&blocks[0]).await.unwrap();
        assert_eq!(t.poll_stats().await.unwrap().free, 64);
    }

    #[tokio::test]
    async fn test_out_of_range_write() {
        let t = target(16);
        let err = t.write(8, Bytes::from_static(&[0u8; 16])).await;
        assert!(err.is_err());
    }
}
