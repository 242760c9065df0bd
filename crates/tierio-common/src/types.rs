//! Core type definitions for TierIO
//!
//! This module defines the fundamental types used throughout the system:
//! identifiers, buffer descriptors, flag sets, and telemetry records.
//!
//! Tag and blob identifiers are `{node_id, hash, unique}` triples. The
//! embedded hash is the routing hash of the name the object was created
//! under, so operations that only carry an id still land on the lane that
//! owns the name entry.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a tag (a named container of blobs)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId {
    /// Node that created the tag
    pub node_id: u32,
    /// Routing hash of the tag name
    pub hash: u32,
    /// Node-local unique counter value
    pub unique: u64,
}

impl TagId {
    /// Create a new tag ID
    #[must_use]
    pub const fn new(node_id: u32, hash: u32, unique: u64) -> Self {
        Self {
            node_id,
            hash,
            unique,
        }
    }

    /// The null tag ID (matches no tag)
    #[must_use]
    pub const fn null() -> Self {
        Self::new(0, 0, 0)
    }

    /// Check whether this is the null ID
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.node_id == 0 && self.hash == 0 && self.unique == 0
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({}.{}.{})", self.node_id, self.hash, self.unique)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.node_id, self.hash, self.unique)
    }
}

/// Unique identifier for a blob (a named byte range inside a tag)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId {
    /// Node that created the blob
    pub node_id: u32,
    /// Routing hash of the qualified blob name
    pub hash: u32,
    /// Node-local unique counter value
    pub unique: u64,
}

impl BlobId {
    /// Create a new blob ID
    #[must_use]
    pub const fn new(node_id: u32, hash: u32, unique: u64) -> Self {
        Self {
            node_id,
            hash,
            unique,
        }
    }

    /// The null blob ID (matches no blob)
    #[must_use]
    pub const fn null() -> Self {
        Self::new(0, 0, 0)
    }

    /// Check whether this is the null ID
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.node_id == 0 && self.hash == 0 && self.unique == 0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({}.{}.{})", self.node_id, self.hash, self.unique)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.node_id, self.hash, self.unique)
    }
}

/// Identifier for a storage target on a node
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId {
    /// Node that owns the target
    pub node_id: u32,
    /// Index of the target in the node's registry (fastest first)
    pub index: u32,
}

impl TargetId {
    /// Create a new target ID
    #[must_use]
    pub const fn new(node_id: u32, index: u32) -> Self {
        Self { node_id, index }
    }
}

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetId({}.{})", self.node_id, self.index)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.index)
    }
}

/// A byte range allocated on one target.
///
/// The ordered concatenation of a blob's buffers is the logical blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    /// Target holding the range
    pub target_id: TargetId,
    /// Byte offset on the target
    pub offset: u64,
    /// Length of the range in bytes
    pub size: u64,
}

impl BufferInfo {
    /// Create a new buffer descriptor
    #[must_use]
    pub const fn new(target_id: TargetId, offset: u64, size: u64) -> Self {
        Self {
            target_id,
            offset,
            size,
        }
    }
}

/// Live statistics for a storage target
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetStats {
    /// Remaining free capacity in bytes
    pub free: u64,
    /// Total capacity in bytes
    pub max_cap: u64,
    /// Write bandwidth in MB/s
    pub write_bw: f32,
    /// Write latency in microseconds
    pub write_latency: f32,
}

/// Kind of I/O recorded in the access-pattern log
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoType {
    /// Blob read
    #[display("read")]
    Read,
    /// Blob write
    #[display("write")]
    Write,
}

/// One access-pattern record.
///
/// `id` is assigned by the ring from a monotonic sequence; records can be
/// compared and replayed in push order by it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IoStat {
    /// Operation kind
    pub op: IoType,
    /// Blob the operation touched
    pub blob_id: BlobId,
    /// Tag containing the blob
    pub tag_id: TagId,
    /// Bytes moved
    pub size: u64,
    /// Ring-assigned sequence number
    pub id: u64,
}

/// How `tag_update_size` combines the update with the current size
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateSizeMode {
    /// Add the signed delta to the current size
    #[display("add")]
    Add,
    /// Set the size to `max(current, update)`
    #[display("cap")]
    Cap,
}

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr;)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self(1 << $bit);)*

            /// The empty flag set
            #[must_use]
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Check whether every flag in `other` is set
            #[must_use]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Set every flag in `other`
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Clear every flag in `other`
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

flag_set! {
    /// Flags carried on a tag
    TagFlags {
        /// The tag is bridged to an external backing store
        SHOULD_STAGE = 0;
    }
}

flag_set! {
    /// Flags carried on blob operations
    BlobFlags {
        /// Stage the blob in from the backing store before first access
        SHOULD_STAGE = 0;
        /// Set by the engine when the operation created the blob
        DID_CREATE = 1;
        /// The put carries staged-in bytes; tag size is not recounted
        DID_STAGE_IN = 2;
    }
}

flag_set! {
    /// Flags for `destroy_blob`
    DestroyFlags {
        /// Do not remove the blob from its tag's blob list (used when the
        /// tag itself is being destroyed and is iterating that list)
        KEEP_IN_TAG = 0;
    }
}

/// Point-in-time snapshot of one blob's metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub blob_id: BlobId,
    pub tag_id: TagId,
    pub name: String,
    pub blob_size: u64,
    pub max_blob_size: u64,
    pub score: f32,
    pub user_score: f32,
    pub mod_count: u64,
    pub last_flush: u64,
    pub access_freq: u64,
    pub buffers: Vec<BufferInfo>,
}

/// Point-in-time snapshot of one tag's metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagMetadata {
    pub tag_id: TagId,
    pub name: String,
    pub owner: bool,
    pub internal_size: u64,
    pub flags: TagFlags,
    pub blob_count: usize,
}

/// Point-in-time snapshot of one target's state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub target_id: TargetId,
    pub name: String,
    pub stats: TargetStats,
    pub score: f32,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_ids() {
        assert!(TagId::null().is_null());
        assert!(BlobId::null().is_null());
        assert!(!TagId::new(1, 0, 0).is_null());
        assert!(!BlobId::new(0, 7, 3).is_null());
    }

    #[test]
    fn test_flag_sets() {
        let mut flags = BlobFlags::empty();
        assert!(!flags.contains(BlobFlags::SHOULD_STAGE));

        flags.insert(BlobFlags::SHOULD_STAGE);
        assert!(flags.contains(BlobFlags::SHOULD_STAGE));
        assert!(!flags.contains(BlobFlags::DID_CREATE));

        let both = BlobFlags::SHOULD_STAGE | BlobFlags::DID_CREATE;
        assert!(both.contains(BlobFlags::SHOULD_STAGE));
        assert!(both.contains(BlobFlags::DID_CREATE));

        flags.remove(BlobFlags::SHOULD_STAGE);
        assert_eq!(flags, BlobFlags::empty());
    }

    #[test]
    fn test_id_display() {
        let id = BlobId::new(2, 0xdead, 41);
        assert_eq!(id.to_string(), format!("2.{}.41", 0xdeadu32));
    }
}
