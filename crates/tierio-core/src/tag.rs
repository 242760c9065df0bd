//! Tag engine
//!
//! Tag CRUD, size accounting, and contained-blob list maintenance. Every
//! operation resolves its owning lane through the router, takes the lane's
//! tag rwlock (read for lookups, write for create/destroy), and mutates the
//! per-tag state under the tag's own lock.

use crate::engine::Engine;
use crate::lane::{Tag, TagState};
use std::sync::Arc;
use tierio_common::{BlobId, DestroyFlags, Result, TagFlags, TagId, UpdateSizeMode};
use tierio_stage::StagerSpec;
use tokio::sync::RwLock;
use tracing::{debug, warn};

impl Engine {
    /// Create a tag or return the id of an existing one.
    ///
    /// When `SHOULD_STAGE` is set, `params` describes the stager to
    /// register for the tag (see `tierio_stage::StagerSpec`).
    pub async fn get_or_create_tag(
        &self,
        name: &str,
        owner: bool,
        backend_size: u64,
        flags: TagFlags,
        params: &str,
    ) -> Result<TagId> {
        let lane = self.tag_lane(Some(name), TagId::null()).await;
        {
            let maps = lane.tags.read().await;
            if let Some(id) = maps.ids.get(name) {
                debug!(tag = name, %id, "found existing tag");
                return Ok(*id);
            }
        }

        let mut maps = lane.tags.write().await;
        if let Some(id) = maps.ids.get(name) {
            return Ok(*id);
        }
        // Build the stager before touching the maps so a rejected spec
        // leaves no half-created tag behind.
        let stager = if flags.contains(TagFlags::SHOULD_STAGE) {
            Some(StagerSpec::from_params(params)?.build()?)
        } else {
            None
        };
        let tag_id = TagId::new(
            self.node_id(),
            self.router.hash_tag_name(name),
            self.next_unique(),
        );
        debug!(tag = name, %tag_id, "creating tag for the first time");
        maps.ids.insert(name.to_string(), tag_id);
        maps.tags.insert(
            tag_id,
            Arc::new(Tag {
                id: tag_id,
                name: name.to_string(),
                owner,
                flags,
                state: RwLock::new(TagState {
                    internal_size: backend_size,
                    blobs: Vec::new(),
                }),
            }),
        );
        if let Some(stager) = stager {
            // Installed before the map lock drops: the tag is never
            // visible with SHOULD_STAGE set and no stager attached.
            debug!(%tag_id, tag = name, kind = stager.kind(), "registering stager");
            lane.stagers.lock().await.insert(tag_id, stager);
        }
        Ok(tag_id)
    }

    /// Id of an existing tag, or `None`
    pub async fn get_tag_id(&self, name: &str) -> Option<TagId> {
        let lane = self.tag_lane(Some(name), TagId::null()).await;
        let maps = lane.tags.read().await;
        maps.ids.get(name).copied()
    }

    /// Name of an existing tag, or `None`
    pub async fn get_tag_name(&self, tag_id: TagId) -> Option<String> {
        let lane = self.tag_lane(None, tag_id).await;
        let maps = lane.tags.read().await;
        maps.tags.get(&tag_id).map(|tag| tag.name.clone())
    }

    /// Destroy a tag: contained blobs are destroyed when the tag owns
    /// them, the stager is unregistered, and the tag leaves both maps.
    pub async fn destroy_tag(&self, tag_id: TagId) -> Result<()> {
        let lane = self.tag_lane(None, tag_id).await;
        let mut maps = lane.tags.write().await;
        let Some(tag) = maps.tags.remove(&tag_id) else {
            return Ok(());
        };
        maps.ids.remove(&tag.name);
        drop(maps);

        if tag.owner {
            let blobs = tag.state.read().await.blobs.clone();
            for blob_id in blobs {
                // KEEP_IN_TAG: the list being iterated is already gone.
                if let Err(err) = self
                    .destroy_blob(tag_id, blob_id, DestroyFlags::KEEP_IN_TAG)
                    .await
                {
                    warn!(%tag_id, %blob_id, %err, "failed to destroy contained blob");
                }
            }
        }
        if tag.flags.contains(TagFlags::SHOULD_STAGE) {
            self.unregister_stager(tag_id).await;
        }
        debug!(%tag_id, tag = %tag.name, "destroyed tag");
        Ok(())
    }

    /// Append a blob to the tag's contained list
    pub async fn tag_add_blob(&self, tag_id: TagId, blob_id: BlobId) {
        let Some(tag) = self.tag_arc(tag_id).await else {
            return;
        };
        let mut state = tag.state.write().await;
        if !state.blobs.contains(&blob_id) {
            state.blobs.push(blob_id);
        }
    }

    /// Remove a blob from the tag's contained list
    pub async fn tag_remove_blob(&self, tag_id: TagId, blob_id: BlobId) {
        let Some(tag) = self.tag_arc(tag_id).await else {
            return;
        };
        let mut state = tag.state.write().await;
        state.blobs.retain(|id| *id != blob_id);
    }

    /// Destroy every contained blob (when the tag owns them), clear the
    /// list, and zero the tag's logical size.
    pub async fn tag_clear_blobs(&self, tag_id: TagId) -> Result<()> {
        let Some(tag) = self.tag_arc(tag_id).await else {
            return Ok(());
        };
        let blobs = {
            let mut state = tag.state.write().await;
            let blobs = std::mem::take(&mut state.blobs);
            state.internal_size = 0;
            blobs
        };
        if tag.owner {
            for blob_id in blobs {
                if let Err(err) = self
                    .destroy_blob(tag_id, blob_id, DestroyFlags::KEEP_IN_TAG)
                    .await
                {
                    warn!(%tag_id, %blob_id, %err, "failed to destroy contained blob");
                }
            }
        }
        Ok(())
    }

    /// Logical size of a tag (0 when missing)
    pub async fn tag_get_size(&self, tag_id: TagId) -> u64 {
        match self.tag_arc(tag_id).await {
            Some(tag) => tag.state.read().await.internal_size,
            None => 0,
        }
    }

    /// Update a tag's logical size: `Add` applies the signed delta, `Cap`
    /// raises the size to `update` if larger.
    pub async fn tag_update_size(&self, tag_id: TagId, update: i64, mode: UpdateSizeMode) {
        let Some(tag) = self.tag_arc(tag_id).await else {
            return;
        };
        let mut state = tag.state.write().await;
        let current = state.internal_size;
        state.internal_size = match mode {
            UpdateSizeMode::Add => (current as i64 + update).max(0) as u64,
            UpdateSizeMode::Cap => current.max(update.max(0) as u64),
        };
        debug!(%tag_id, from = current, to = state.internal_size, update, %mode,
            "updated tag size");
    }

    /// Ids of the blobs contained in the tag
    pub async fn tag_get_contained_blob_ids(&self, tag_id: TagId) -> Vec<BlobId> {
        match self.tag_arc(tag_id).await {
            Some(tag) => tag.state.read().await.blobs.clone(),
            None => Vec::new(),
        }
    }

    /// Flush every contained blob; returns how many staged out
    pub async fn tag_flush(&self, tag_id: TagId) -> Result<u64> {
        let mut flushed = 0;
        for blob_id in self.tag_get_contained_blob_ids(tag_id).await {
            if self.flush_blob(blob_id).await? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    async fn tag_arc(&self, tag_id: TagId) -> Option<Arc<Tag>> {
        let lane = self.tag_lane(None, tag_id).await;
        let maps = lane.tags.read().await;
        maps.tags.get(&tag_id).map(Arc::clone)
    }
}
