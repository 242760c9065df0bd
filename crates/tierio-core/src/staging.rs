//! Staging integration
//!
//! The stager map lives on the lane that owns the tag, guarded by the
//! lane's stager mutex. A missing stager is a warning, not an error: the
//! operation skips the stage and keeps going.

use crate::engine::Engine;
use bytes::Bytes;
use std::sync::Arc;
use tierio_common::{Result, TagId};
use tierio_stage::{Stager, StagerSpec};
use tracing::{debug, warn};

impl Engine {
    /// Register the stager plugin described by `params` for a tag
    pub async fn register_stager(&self, tag_id: TagId, tag_name: &str, params: &str) -> Result<()> {
        let spec = StagerSpec::from_params(params)?;
        let stager = spec.build()?;
        debug!(%tag_id, tag = tag_name, kind = stager.kind(), "registering stager");
        let lane = self.tag_lane(None, tag_id).await;
        lane.stagers.lock().await.insert(tag_id, stager);
        Ok(())
    }

    /// Drop a tag's stager, if registered
    pub async fn unregister_stager(&self, tag_id: TagId) {
        let lane = self.tag_lane(None, tag_id).await;
        if lane.stagers.lock().await.remove(&tag_id).is_some() {
            debug!(%tag_id, "unregistered stager");
        }
    }

    /// The stager registered for a tag, if any
    pub async fn stager_for(&self, tag_id: TagId) -> Option<Arc<dyn Stager>> {
        let lane = self.tag_lane(None, tag_id).await;
        lane.stagers.lock().await.get(&tag_id).cloned()
    }

    /// Pull a blob's bytes from the tag's backing store.
    ///
    /// A missing stager logs a warning and yields `None`; the caller keeps
    /// operating on an empty blob.
    pub async fn stage_in(
        &self,
        tag_id: TagId,
        blob_name: &str,
        score: f32,
    ) -> Result<Option<Bytes>> {
        let Some(stager) = self.stager_for(tag_id).await else {
            warn!(%tag_id, blob_name, "no stager registered; skipping stage-in");
            return Ok(None);
        };
        stager.stage_in(tag_id, blob_name, score).await
    }

    /// Write a blob's bytes back to the tag's backing store.
    ///
    /// A missing stager logs a warning and skips the stage; `Err` is
    /// reserved for failures reported by the stager itself.
    pub async fn stage_out(&self, tag_id: TagId, blob_name: &str, data: Bytes) -> Result<()> {
        let Some(stager) = self.stager_for(tag_id).await else {
            warn!(%tag_id, blob_name, "no stager registered; skipping stage-out");
            return Ok(());
        };
        stager.stage_out(tag_id, blob_name, data).await
    }
}
