//! Background flush
//!
//! A periodic sweep over every blob in every lane. A blob is dirty when it
//! has been staged in (`last_flush > 0`) and modified since
//! (`mod_count > last_flush`); dirty blobs are read back end-to-end and
//! handed to the tag's stager. A failed stage-out leaves `last_flush`
//! unchanged so the next sweep retries.

use crate::engine::Engine;
use crate::lane::Blob;
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tierio_common::{BlobFlags, BlobId, Result, TagId};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

impl Engine {
    /// Flush one blob if dirty; returns whether it transitioned to clean
    pub async fn flush_blob(&self, blob_id: BlobId) -> Result<bool> {
        let lane = self.blob_lane(TagId::null(), None, Some(blob_id)).await;
        let blob = {
            let maps = lane.blobs.read().await;
            maps.blobs.get(&blob_id).map(Arc::clone)
        };
        match blob {
            Some(blob) => self.flush_one(&blob).await,
            None => Ok(false),
        }
    }

    /// Sweep every lane, flushing each dirty blob; returns the number of
    /// blobs that transitioned to clean.
    pub async fn flush_data(&self) -> Result<u64> {
        let mut flushed = 0;
        for lane in &self.lanes {
            let blobs: Vec<Arc<Blob>> = {
                let maps = lane.blobs.read().await;
                maps.blobs.values().map(Arc::clone).collect()
            };
            for blob in blobs {
                if self.flush_one(&blob).await? {
                    flushed += 1;
                }
            }
        }
        Ok(flushed)
    }

    async fn flush_one(&self, blob: &Arc<Blob>) -> Result<bool> {
        let mod_count = blob.mod_count.load(Ordering::Acquire);
        let last_flush = blob.last_flush.load(Ordering::Acquire);
        if last_flush == 0 || mod_count <= last_flush {
            return Ok(false);
        }
        self.note_pending_flush();
        debug!(blob = %blob.id, mod_count, last_flush, "flushing blob");

        let blob_size = blob.state.read().await.blob_size;
        let mut data = vec![0u8; blob_size as usize];
        let got = self
            .get_blob(blob.tag_id, None, Some(blob.id), 0, &mut data, BlobFlags::empty())
            .await?;
        data.truncate(got.bytes_read as usize);

        match self
            .stage_out(blob.tag_id, &blob.name, Bytes::from(data))
            .await
        {
            Ok(()) => {
                blob.last_flush.store(mod_count, Ordering::Release);
                Ok(true)
            }
            Err(err) => {
                warn!(blob = %blob.id, %err, "stage-out failed; leaving blob dirty");
                Ok(false)
            }
        }
    }

    /// Spawn the periodic flush sweep at the configured period
    pub fn spawn_flush_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = self.flush_period();
        tokio::spawn(flush_loop(engine, period))
    }

    /// Spawn the periodic target stats refresh
    pub fn spawn_stats_loop(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.registry().refresh().await;
            }
        })
    }
}

/// Long-running flush task: sweep dirty blobs every `period`
pub async fn flush_loop(engine: Arc<Engine>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match engine.flush_data().await {
            Ok(0) => {}
            Ok(flushed) => info!(flushed, "flush sweep staged out dirty blobs"),
            Err(err) => warn!(%err, "flush sweep failed"),
        }
    }
}
