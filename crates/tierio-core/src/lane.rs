//! Lane shards
//!
//! A lane owns a fraction of the node's tag and blob metadata, selected by
//! the routing hash of the name or id involved. Each lane holds four maps
//! (tag name -> id, tag id -> tag, qualified blob name -> id, blob id ->
//! blob) plus the stager map, guarded by two cooperative rwlocks and a
//! mutex. Map write locks are held only for insert and remove; the data
//! phase of an operation serializes on the per-blob lock instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tierio_common::{BlobId, BufferInfo, TagFlags, TagId};
use tierio_stage::Stager;
use tokio::sync::{Mutex, RwLock};

/// Qualified blob name: unique within a node, not just within a tag
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BlobKey {
    pub tag_id: TagId,
    pub name: String,
}

impl BlobKey {
    pub(crate) fn new(tag_id: TagId, name: &str) -> Self {
        Self {
            tag_id,
            name: name.to_string(),
        }
    }
}

/// Mutable portion of a tag
#[derive(Debug, Default)]
pub(crate) struct TagState {
    pub internal_size: u64,
    pub blobs: Vec<BlobId>,
}

/// A named container of blobs, owned by one lane
pub(crate) struct Tag {
    pub id: TagId,
    pub name: String,
    pub owner: bool,
    pub flags: TagFlags,
    pub state: RwLock<TagState>,
}

/// Mutable portion of a blob, guarded by the per-blob rwlock.
///
/// The ordered concatenation of `buffers` spans `[0, max_blob_size)`;
/// `blob_size <= max_blob_size` always holds.
#[derive(Debug)]
pub(crate) struct BlobState {
    pub buffers: Vec<BufferInfo>,
    pub blob_size: u64,
    pub max_blob_size: u64,
    pub score: f32,
    pub user_score: f32,
    pub tags: Vec<TagId>,
}

impl Default for BlobState {
    fn default() -> Self {
        Self {
            buffers: Vec::new(),
            blob_size: 0,
            max_blob_size: 0,
            score: 1.0,
            user_score: 0.0,
            tags: Vec::new(),
        }
    }
}

/// A byte range inside a tag, owned by one lane.
///
/// The flush counters live outside the state lock so the read path and the
/// flush sweep never need the write lock. `last_flush == 0` means the blob
/// has never been staged in; `last_flush == mod_count` means clean.
pub(crate) struct Blob {
    pub id: BlobId,
    pub tag_id: TagId,
    pub name: String,
    pub mod_count: AtomicU64,
    pub last_flush: AtomicU64,
    pub access_freq: AtomicU64,
    pub read_count: AtomicU64,
    pub write_count: AtomicU64,
    pub state: RwLock<BlobState>,
}

impl Blob {
    pub(crate) fn new(id: BlobId, tag_id: TagId, name: &str) -> Self {
        Self {
            id,
            tag_id,
            name: name.to_string(),
            mod_count: AtomicU64::new(0),
            last_flush: AtomicU64::new(0),
            access_freq: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            state: RwLock::new(BlobState::default()),
        }
    }

    pub(crate) fn update_write_stats(&self) {
        self.mod_count.fetch_add(1, Ordering::Relaxed);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.access_freq.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn update_read_stats(&self) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.access_freq.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub(crate) struct TagMaps {
    pub ids: HashMap<String, TagId>,
    pub tags: HashMap<TagId, Arc<Tag>>,
}

#[derive(Default)]
pub(crate) struct BlobMaps {
    pub ids: HashMap<BlobKey, BlobId>,
    pub blobs: HashMap<BlobId, Arc<Blob>>,
}

/// One metadata shard
pub(crate) struct Lane {
    pub tags: RwLock<TagMaps>,
    pub blobs: RwLock<BlobMaps>,
    pub stagers: Mutex<HashMap<TagId, Arc<dyn Stager>>>,
}

impl Lane {
    pub(crate) fn new() -> Self {
        Self {
            tags: RwLock::new(TagMaps::default()),
            blobs: RwLock::new(BlobMaps::default()),
            stagers: Mutex::new(HashMap::new()),
        }
    }

    /// Owner predicate for the router's cache-hit check: true only when
    /// this lane already holds the tag entry. Not a getter.
    pub(crate) async fn owns_tag(&self, name: Option<&str>, id: TagId) -> bool {
        let maps = self.tags.read().await;
        match name {
            Some(name) => maps.ids.contains_key(name),
            None => maps.tags.contains_key(&id),
        }
    }

    /// Owner predicate for the router's cache-hit check, blob flavor.
    pub(crate) async fn owns_blob(
        &self,
        tag_id: TagId,
        name: Option<&str>,
        id: Option<BlobId>,
    ) -> bool {
        let maps = self.blobs.read().await;
        if let Some(name) = name {
            return maps.ids.contains_key(&BlobKey::new(tag_id, name));
        }
        match id {
            Some(id) => maps.blobs.contains_key(&id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_owner_predicates() {
        let lane = Lane::new();
        let tag_id = TagId::new(1, 10, 1);
        let blob_id = BlobId::new(1, 20, 2);

        assert!(!lane.owns_tag(Some("t1"), TagId::null()).await);
        assert!(!lane.owns_blob(tag_id, Some("b1"), None).await);

        {
            let mut tags = lane.tags.write().await;
            tags.ids.insert("t1".to_string(), tag_id);
            tags.tags.insert(
                tag_id,
                Arc::new(Tag {
                    id: tag_id,
                    name: "t1".to_string(),
                    owner: true,
                    flags: TagFlags::empty(),
                    state: RwLock::new(TagState::default()),
                }),
            );
            let mut blobs = lane.blobs.write().await;
            blobs.ids.insert(BlobKey::new(tag_id, "b1"), blob_id);
            blobs
                .blobs
                .insert(blob_id, Arc::new(Blob::new(blob_id, tag_id, "b1")));
        }

        assert!(lane.owns_tag(Some("t1"), TagId::null()).await);
        assert!(lane.owns_tag(None, tag_id).await);
        assert!(lane.owns_blob(tag_id, Some("b1"), None).await);
        assert!(lane.owns_blob(tag_id, None, Some(blob_id)).await);
        // Same name under a different tag is a different key.
        assert!(!lane.owns_blob(TagId::new(1, 11, 9), Some("b1"), None).await);
    }

    #[test]
    fn test_blob_counters() {
        let blob = Blob::new(BlobId::new(1, 0, 1), TagId::new(1, 0, 2), "b");
        blob.update_write_stats();
        blob.update_write_stats();
        blob.update_read_stats();
        assert_eq!(blob.mod_count.load(Ordering::Relaxed), 2);
        assert_eq!(blob.write_count.load(Ordering::Relaxed), 2);
        assert_eq!(blob.read_count.load(Ordering::Relaxed), 1);
        assert_eq!(blob.access_freq.load(Ordering::Relaxed), 3);
    }
}
