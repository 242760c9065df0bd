//! File-backed target
//!
//! One preallocated file per target under its mount point. Positioned reads
//! and writes run on the blocking pool so lane tasks only suspend, never
//! block a worker thread.

use crate::alloc::ExtentAllocator;
use crate::{Block, Target};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::Arc;
use tierio_common::{Result, TargetConfig, TargetId, TargetStats};
use tracing::info;

/// A file-backed tier (NVMe mount, burst buffer, parallel file system)
pub struct FileTarget {
    id: TargetId,
    name: String,
    path: PathBuf,
    file: Arc<File>,
    alloc: Mutex<ExtentAllocator>,
    capacity: u64,
    bandwidth_mbps: f32,
    latency_us: f32,
}

impl FileTarget {
    /// Create the backing file under the configured mount point and size it
    /// to the full capacity.
    pub fn create(id: TargetId, config: &TargetConfig) -> Result<Self> {
        fs::create_dir_all(&config.mount_point)?;
        let path = config.mount_point.join(format!("{}.tier", config.name));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(config.capacity)?;
        info!(device = %config.name, path = %path.display(), capacity = config.capacity,
            "created file target");
        let max_block = config.slab_sizes.iter().copied().max().unwrap_or(0);
        Ok(Self {
            id,
            name: config.name.clone(),
            path,
            file: Arc::new(file),
            alloc: Mutex::new(ExtentAllocator::new(config.capacity, max_block)),
            capacity: config.capacity,
            bandwidth_mbps: config.bandwidth_mbps,
            latency_us: config.latency_us,
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl Target for FileTarget {
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
        let file = Arc::clone(&self.file);
        let len = data.len();
        tokio::task::spawn_blocking(move || file.write_all_at(&data, offset))
            .await
            .expect("blocking write task panicked")?;
        Ok(len)
    }

    async fn read(&self, offset: u64, len: u64) -> Result<Bytes> {
        let file = Arc::clone(&self.file);
        let buf = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len as usize];
            file.read_exact_at(&mut buf, offset)?;
            Ok::<_, std::io::Error>(buf)
        })
        .await
        .expect("blocking read task panicked")?;
        Ok(Bytes::from(buf))
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
