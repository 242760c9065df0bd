//! Blob engine
//!
//! Owns allocation of buffer ranges across targets, the read/write fan-out
//! to target clients, partial-range logic, and the `blob_size` /
//! `max_blob_size` bookkeeping.
//!
//! A put that grows the blob asks the placement engine for a schema over
//! the growth only; existing buffers are never moved. The allocation loop
//! spills any shortfall on sub-placement `i` into sub-placement `i + 1`,
//! and the engine appends a zero-size sub-placement on the fallback target
//! so spillover always has somewhere to land.

use crate::engine::Engine;
use crate::lane::{Blob, BlobKey};
use bytes::Bytes;
use futures::future::join_all;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tierio_common::{
    BlobFlags, BlobId, BufferInfo, DestroyFlags, IoType, Result, TagId, UpdateSizeMode,
};
use tierio_placement::{PlacementContext, SubPlacement};
use tierio_target::Block;
use tracing::{debug, warn};

/// Result of a put
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    /// Blob the data landed in (created on demand)
    pub blob_id: BlobId,
    /// Bytes actually written; less than requested on allocation or write
    /// shortfall
    pub bytes_written: u64,
}

/// Result of a get
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GetOutcome {
    /// Blob the data came from
    pub blob_id: BlobId,
    /// Bytes placed into the caller's buffer
    pub bytes_read: u64,
}

/// One scheduled target transfer produced by the buffer-cursor walk
struct Segment {
    target_id: tierio_common::TargetId,
    target_off: u64,
    payload_off: u64,
    len: u64,
}

/// Walk `buffers` and cut `[off, off + len)` into per-target segments.
///
/// Buffers entirely left of `off` are skipped; the walk ends at the last
/// buffer overlapping the range. Returns the segments and the number of
/// payload bytes covered (short when the buffers end early).
fn cut_segments(buffers: &[BufferInfo], off: u64, len: u64) -> (Vec<Segment>, u64) {
    let blob_right = off + len;
    let mut segments = Vec::new();
    let mut blob_off = off;
    let mut buf_left = 0u64;
    let mut payload_off = 0u64;
    let mut found_left = false;
    for buf in buffers {
        let buf_right = buf_left + buf.size;
        if blob_off >= blob_right {
            break;
        }
        if buf_left <= blob_off && blob_off < buf_right {
            found_left = true;
        }
        if found_left {
            let rel_off = blob_off - buf_left;
            let mut seg_len = buf.size - rel_off;
            if buf_right > blob_right {
                seg_len = blob_right - (buf_left + rel_off);
            }
            segments.push(Segment {
                target_id: buf.target_id,
                target_off: buf.offset + rel_off,
                payload_off,
                len: seg_len,
            });
            payload_off += seg_len;
            blob_off = buf_right;
        }
        buf_left += buf.size;
    }
    (segments, payload_off)
}

impl Engine {
    /// Put `data` into a blob at `blob_off`, creating the blob on demand.
    ///
    /// Returns the blob id and the bytes written; `bytes_written` is zero
    /// when no target had capacity for required growth, and short when a
    /// target write came up short.
    pub async fn put_blob(
        &self,
        tag_id: TagId,
        name: Option<&str>,
        blob_id: Option<BlobId>,
        blob_off: u64,
        data: Bytes,
        score: f32,
        mut flags: BlobFlags,
    ) -> Result<PutOutcome> {
        let Some((blob, did_create)) = self.resolve_blob(tag_id, name, blob_id, true).await else {
            return Ok(PutOutcome {
                blob_id: blob_id.unwrap_or_else(BlobId::null),
                bytes_written: 0,
            });
        };
        if did_create {
            flags.insert(BlobFlags::DID_CREATE);
        }
        if flags.contains(BlobFlags::SHOULD_STAGE) {
            self.maybe_stage_in(&blob, score).await;
        }
        let bytes_written = self.put_inner(&blob, blob_off, data, score, flags).await?;
        Ok(PutOutcome {
            blob_id: blob.id,
            bytes_written,
        })
    }

    /// Read a blob range into `out`, creating the blob on demand (a fresh
    /// blob reads zero bytes; with `SHOULD_STAGE` it is staged in first).
    pub async fn get_blob(
        &self,
        tag_id: TagId,
        name: Option<&str>,
        blob_id: Option<BlobId>,
        blob_off: u64,
        out: &mut [u8],
        flags: BlobFlags,
    ) -> Result<GetOutcome> {
        let Some((blob, _)) = self.resolve_blob(tag_id, name, blob_id, true).await else {
            return Ok(GetOutcome {
                blob_id: blob_id.unwrap_or_else(BlobId::null),
                bytes_read: 0,
            });
        };
        if flags.contains(BlobFlags::SHOULD_STAGE) {
            self.maybe_stage_in(&blob, 1.0).await;
        }

        let state = blob.state.read().await;
        let (segments, _) = cut_segments(&state.buffers, blob_off, out.len() as u64);
        debug!(blob = %blob.id, off = blob_off, len = out.len(),
            segments = segments.len(), "reading blob");
        let reads = segments.into_iter().filter_map(|seg| {
            let entry = self.registry.get(&seg.target_id)?;
            let client = Arc::clone(&entry.client);
            Some(async move { (seg.payload_off, client.read(seg.target_off, seg.len).await) })
        });
        let results = join_all(reads).await;
        drop(state);

        let mut bytes_read = 0u64;
        for (payload_off, result) in results {
            match result {
                Ok(data) => {
                    let start = payload_off as usize;
                    out[start..start + data.len()].copy_from_slice(&data);
                    bytes_read += data.len() as u64;
                }
                Err(err) => warn!(blob = %blob.id, %err, "target read failed"),
            }
        }

        blob.update_read_stats();
        self.io_log.push(IoType::Read, blob.id, blob.tag_id, bytes_read);
        Ok(GetOutcome {
            blob_id: blob.id,
            bytes_read,
        })
    }

    /// Data phase of a put plus its bookkeeping; the blob already exists.
    pub(crate) async fn put_inner(
        &self,
        blob: &Arc<Blob>,
        blob_off: u64,
        data: Bytes,
        score: f32,
        flags: BlobFlags,
    ) -> Result<u64> {
        let len = data.len() as u64;
        let needed = blob_off + len;
        let size_diff;
        let written;
        {
            let mut state = blob.state.write().await;
            size_diff = needed.saturating_sub(state.max_blob_size);
            let prior_blob_size = state.blob_size;
            state.blob_size = state.blob_size.max(needed);
            debug!(blob = %blob.id, off = blob_off, len, size_diff, "put");

            if size_diff > 0 {
                let snapshots = self.target_snapshots();
                let ctx = PlacementContext { score };
                let mut placements = match self.policy.placement(&[size_diff], &snapshots, &ctx) {
                    Ok(mut schemas) => schemas.remove(0).placements,
                    Err(err) => {
                        warn!(blob = %blob.id, %err, "placement failed");
                        state.blob_size = prior_blob_size;
                        return Ok(0);
                    }
                };
                // Zero-size fallback sub-placement absorbs spillover.
                placements.push(SubPlacement::new(self.registry.fallback().id, 0));

                let mut allocated = 0u64;
                let mut idx = 0;
                while idx < placements.len() {
                    let sub = placements[idx];
                    idx += 1;
                    if sub.size == 0 {
                        continue;
                    }
                    let Some(entry) = self.registry.get(&sub.target_id) else {
                        continue;
                    };
                    let blocks = match entry.client.allocate(sub.size).await {
                        Ok(blocks) => blocks,
                        Err(err) => {
                            warn!(device = %sub.target_id, %err, "allocation failed");
                            Vec::new()
                        }
                    };
                    let mut sub_alloc = 0u64;
                    for block in blocks {
                        if block.size == 0 {
                            continue;
                        }
                        state
                            .buffers
                            .push(BufferInfo::new(sub.target_id, block.offset, block.size));
                        sub_alloc += block.size;
                    }
                    if sub_alloc < sub.size {
                        if let Some(next) = placements.get_mut(idx) {
                            next.size += sub.size - sub_alloc;
                        }
                    }
                    entry.charge(sub_alloc);
                    allocated += sub_alloc;
                }
                if allocated == 0 {
                    // No partial commit on total allocation failure.
                    state.blob_size = prior_blob_size;
                    warn!(blob = %blob.id, size_diff, "no target had capacity");
                    return Ok(0);
                }
            }

            let (segments, _) = cut_segments(&state.buffers, blob_off, len);
            let writes = segments.into_iter().filter_map(|seg| {
                let entry = self.registry.get(&seg.target_id)?;
                let client = Arc::clone(&entry.client);
                let chunk = data.slice(seg.payload_off as usize..(seg.payload_off + seg.len) as usize);
                Some(async move { client.write(seg.target_off, chunk).await })
            });
            let results = join_all(writes).await;
            written = results
                .into_iter()
                .map(|result| match result {
                    Ok(n) => n as u64,
                    Err(err) => {
                        warn!(blob = %blob.id, %err, "target write failed");
                        0
                    }
                })
                .sum::<u64>();
            state.max_blob_size = state.max_blob_size.max(needed);
        }
        blob.update_write_stats();

        // Bookkeeping runs with no blob locks held.
        if flags.contains(BlobFlags::SHOULD_STAGE) {
            match self.stager_for(blob.tag_id).await {
                Some(stager) => {
                    if let Some(update) = stager.update_size(&blob.name, blob_off, len) {
                        self.tag_update_size(blob.tag_id, update.value, update.mode)
                            .await;
                    }
                }
                None => warn!(tag = %blob.tag_id, "no stager for tag; not updating size"),
            }
        } else if !flags.contains(BlobFlags::DID_STAGE_IN) && size_diff > 0 {
            self.tag_update_size(blob.tag_id, size_diff as i64, UpdateSizeMode::Add)
                .await;
        }
        if flags.contains(BlobFlags::DID_CREATE) {
            self.tag_add_blob(blob.tag_id, blob.id).await;
        }
        self.io_log.push(IoType::Write, blob.id, blob.tag_id, len);
        Ok(written)
    }

    /// One-shot stage-in: only the first accessor of a never-flushed blob
    /// pulls from the backing store. Failures degrade to an empty blob.
    async fn maybe_stage_in(&self, blob: &Arc<Blob>, score: f32) {
        if blob
            .last_flush
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        match self.stage_in(blob.tag_id, &blob.name, score).await {
            Ok(Some(data)) if !data.is_empty() => {
                if let Err(err) = self
                    .put_inner(blob, 0, data, 1.0, BlobFlags::DID_STAGE_IN)
                    .await
                {
                    warn!(blob = %blob.id, %err, "failed to place staged data");
                }
            }
            Ok(_) => {
                // Nothing staged; align the counters so the blob reads as
                // clean until the next modification.
                blob.mod_count.fetch_max(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(blob = %blob.id, %err, "stage-in failed; proceeding with empty blob");
                blob.mod_count.fetch_max(1, Ordering::Relaxed);
            }
        }
    }

    /// Free a blob's buffers back to their targets and drop it from the
    /// maps. `KEEP_IN_TAG` skips the back-removal from the tag's list.
    pub async fn destroy_blob(
        &self,
        tag_id: TagId,
        blob_id: BlobId,
        flags: DestroyFlags,
    ) -> Result<()> {
        let lane = self.blob_lane(tag_id, None, Some(blob_id)).await;
        let mut maps = lane.blobs.write().await;
        let Some(blob) = maps.blobs.remove(&blob_id) else {
            return Ok(());
        };
        maps.ids.remove(&BlobKey::new(blob.tag_id, &blob.name));
        drop(maps);

        let state = blob.state.read().await;
        for buf in &state.buffers {
            let Some(entry) = self.registry.get(&buf.target_id) else {
                continue;
            };
            match entry.client.free(&Block::new(buf.offset, buf.size)).await {
                Ok(()) => entry.credit(buf.size),
                Err(err) => warn!(device = %buf.target_id, %err, "failed to free buffer"),
            }
        }
        drop(state);

        if !flags.contains(DestroyFlags::KEEP_IN_TAG) {
            self.tag_remove_blob(blob.tag_id, blob_id).await;
        }
        debug!(%blob_id, blob = %blob.name, "destroyed blob");
        Ok(())
    }

    /// Clamp a blob's logical size downward. Buffer reclamation is
    /// deferred; later puts reuse the retained capacity.
    pub async fn truncate_blob(&self, tag_id: TagId, blob_id: BlobId, new_size: u64) -> Result<()> {
        let Some((blob, _)) = self.resolve_blob(tag_id, None, Some(blob_id), false).await else {
            return Ok(());
        };
        let mut state = blob.state.write().await;
        state.blob_size = state.blob_size.min(new_size);
        Ok(())
    }

    /// Update a blob's score and rewrite it so future growth follows the
    /// new placement. The rewrite is fire-and-forget.
    pub async fn reorganize_blob(
        self: &Arc<Self>,
        tag_id: TagId,
        name: Option<&str>,
        blob_id: Option<BlobId>,
        score: f32,
        is_user_score: bool,
    ) -> Result<()> {
        let Some((blob, _)) = self.resolve_blob(tag_id, name, blob_id, false).await else {
            return Ok(());
        };
        let size = {
            let mut state = blob.state.write().await;
            if is_user_score {
                state.user_score = score;
            }
            state.score = score;
            state.blob_size
        };

        let mut data = vec![0u8; size as usize];
        self.get_blob(tag_id, None, Some(blob.id), 0, &mut data, BlobFlags::empty())
            .await?;

        let engine = Arc::clone(self);
        let rewrite_id = blob.id;
        tokio::spawn(async move {
            if let Err(err) = engine
                .put_blob(
                    tag_id,
                    None,
                    Some(rewrite_id),
                    0,
                    Bytes::from(data),
                    score,
                    BlobFlags::empty(),
                )
                .await
            {
                warn!(blob = %rewrite_id, %err, "reorganize rewrite failed");
            }
        });
        Ok(())
    }

    /// Id for a blob name, creating the blob if absent
    pub async fn get_or_create_blob_id(&self, tag_id: TagId, name: &str) -> Result<BlobId> {
        let (blob, _) = self
            .resolve_blob(tag_id, Some(name), None, true)
            .await
            .expect("create-mode resolve always yields a blob");
        Ok(blob.id)
    }

    /// Id for an existing blob name, or `None`
    pub async fn get_blob_id(&self, tag_id: TagId, name: &str) -> Option<BlobId> {
        let lane = self.blob_lane(tag_id, Some(name), None).await;
        let maps = lane.blobs.read().await;
        maps.ids.get(&BlobKey::new(tag_id, name)).copied()
    }

    /// Name of an existing blob, or `None`
    pub async fn get_blob_name(&self, tag_id: TagId, blob_id: BlobId) -> Option<String> {
        let blob = self.resolve_blob(tag_id, None, Some(blob_id), false).await?;
        Some(blob.0.name.clone())
    }

    /// Logical size of a blob; a name resolves through create like put
    pub async fn get_blob_size(
        &self,
        tag_id: TagId,
        name: Option<&str>,
        blob_id: Option<BlobId>,
    ) -> u64 {
        match self.resolve_blob(tag_id, name, blob_id, name.is_some()).await {
            Some((blob, _)) => blob.state.read().await.blob_size,
            None => 0,
        }
    }

    /// Placement score of an existing blob, or `None`
    pub async fn get_blob_score(&self, tag_id: TagId, blob_id: BlobId) -> Option<f32> {
        let (blob, _) = self.resolve_blob(tag_id, None, Some(blob_id), false).await?;
        let score = blob.state.read().await.score;
        Some(score)
    }

    /// Buffer layout of an existing blob
    pub async fn get_blob_buffers(&self, tag_id: TagId, blob_id: BlobId) -> Vec<BufferInfo> {
        match self.resolve_blob(tag_id, None, Some(blob_id), false).await {
            Some((blob, _)) => blob.state.read().await.buffers.clone(),
            None => Vec::new(),
        }
    }

    /// Label a blob with a secondary tag
    pub async fn tag_blob(&self, tag_id: TagId, blob_id: BlobId, label: TagId) {
        let Some((blob, _)) = self.resolve_blob(tag_id, None, Some(blob_id), false).await else {
            return;
        };
        let mut state = blob.state.write().await;
        if !state.tags.contains(&label) {
            state.tags.push(label);
        }
    }

    /// Whether a blob carries a secondary tag
    pub async fn blob_has_tag(&self, tag_id: TagId, blob_id: BlobId, label: TagId) -> bool {
        match self.resolve_blob(tag_id, None, Some(blob_id), false).await {
            Some((blob, _)) => blob.state.read().await.tags.contains(&label),
            None => false,
        }
    }

    /// Look up a blob by name or id, optionally creating it.
    ///
    /// Returns the blob and whether this call created it. Id-only lookups
    /// never create.
    pub(crate) async fn resolve_blob(
        &self,
        tag_id: TagId,
        name: Option<&str>,
        blob_id: Option<BlobId>,
        create: bool,
    ) -> Option<(Arc<Blob>, bool)> {
        let lane = self.blob_lane(tag_id, name, blob_id).await;
        if let Some(name) = name {
            let key = BlobKey::new(tag_id, name);
            {
                let maps = lane.blobs.read().await;
                if let Some(id) = maps.ids.get(&key) {
                    return maps.blobs.get(id).map(|blob| (Arc::clone(blob), false));
                }
            }
            if !create {
                return None;
            }
            let mut maps = lane.blobs.write().await;
            if let Some(id) = maps.ids.get(&key) {
                return maps.blobs.get(id).map(|blob| (Arc::clone(blob), false));
            }
            let id = BlobId::new(
                self.node_id(),
                self.router.hash_blob_name(&tag_id, name),
                self.next_unique(),
            );
            debug!(%id, blob = name, %tag_id, "creating blob");
            let blob = Arc::new(Blob::new(id, tag_id, name));
            maps.ids.insert(key, id);
            let prev = maps.blobs.insert(id, Arc::clone(&blob));
            assert!(prev.is_none(), "blob map key collision on {id}");
            Some((blob, true))
        } else {
            let id = blob_id?;
            let maps = lane.blobs.read().await;
            maps.blobs.get(&id).map(|blob| (Arc::clone(blob), false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers() -> Vec<BufferInfo> {
        let t0 = tierio_common::TargetId::new(1, 0);
        let t1 = tierio_common::TargetId::new(1, 1);
        vec![
            BufferInfo::new(t0, 100, 8),
            BufferInfo::new(t0, 200, 8),
            BufferInfo::new(t1, 0, 16),
        ]
    }

    #[test]
    fn test_cut_segments_full_span() {
        let (segments, covered) = cut_segments(&buffers(), 0, 32);
        assert_eq!(covered, 32);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].target_off, 100);
        assert_eq!(segments[0].len, 8);
        assert_eq!(segments[2].payload_off, 16);
        assert_eq!(segments[2].len, 16);
    }

    #[test]
    fn test_cut_segments_interior_range() {
        // [6, 18) crosses all three buffers part-way.
        let (segments, covered) = cut_segments(&buffers(), 6, 12);
        assert_eq!(covered, 12);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].target_off, 106);
        assert_eq!(segments[0].len, 2);
        assert_eq!(segments[1].target_off, 200);
        assert_eq!(segments[1].len, 8);
        assert_eq!(segments[2].target_off, 0);
        assert_eq!(segments[2].len, 2);
    }

    #[test]
    fn test_cut_segments_short_buffers() {
        let (segments, covered) = cut_segments(&buffers(), 24, 32);
        assert_eq!(covered, 8);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].target_off, 8);
    }

    #[test]
    fn test_cut_segments_empty_range() {
        let (segments, covered) = cut_segments(&buffers(), 0, 0);
        assert!(segments.is_empty());
        assert_eq!(covered, 0);
    }
}
