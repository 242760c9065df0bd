//! TierIO Stage - backing-store stagers
//!
//! A stager bridges one tag to an external backing store: `stage_in` pulls a
//! blob's bytes from the store before first access, `stage_out` writes a
//! dirty blob back during flush. Stagers are selected per tag at
//! registration time from a serialized [`StagerSpec`].

pub mod binary;

pub use binary::{BinaryFileStager, PageSlot};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tierio_common::{Error, Result, TagId, UpdateSizeMode};

/// Tag-size adjustment implied by a staged put
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeUpdate {
    /// The update value handed to `tag_update_size`
    pub value: i64,
    /// How the value combines with the current size
    pub mode: UpdateSizeMode,
}

/// A backing-store plugin for one tag
#[async_trait]
pub trait Stager: Send + Sync {
    /// Plugin kind, for logs
    fn kind(&self) -> &'static str;

    /// Pull `blob_name`'s bytes from the backing store.
    ///
    /// `None` means the store has nothing for this blob; the engine
    /// proceeds with an empty blob.
    async fn stage_in(&self, tag_id: TagId, blob_name: &str, score: f32) -> Result<Option<Bytes>>;

    /// Write a blob's bytes back to the backing store
    async fn stage_out(&self, tag_id: TagId, blob_name: &str, data: Bytes) -> Result<()>;

    /// The tag-size adjustment a put of `[off, off + len)` into `blob_name`
    /// implies, or `None` when the name does not map into the store.
    fn update_size(&self, blob_name: &str, off: u64, len: u64) -> Option<SizeUpdate>;
}

/// Serialized stager selection, carried as the `params` string of
/// `register_stager`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagerSpec {
    /// Blobs are fixed-size pages of a backing file
    BinaryFile {
        /// Path of the backing file
        path: PathBuf,
        /// Page size in bytes
        page_size: u64,
    },
}

impl StagerSpec {
    /// Parse a spec from its JSON params string
    pub fn from_params(params: &str) -> Result<Self> {
        serde_json::from_str(params).map_err(|err| Error::InvalidStagerParams(err.to_string()))
    }

    /// Render the spec as a JSON params string
    #[must_use]
    pub fn to_params(&self) -> String {
        serde_json::to_string(self).expect("stager spec serializes")
    }

    /// Build the plugin this spec describes
    pub fn build(&self) -> Result<Arc<dyn Stager>> {
        match self {
            Self::BinaryFile { path, page_size } => {
                if *page_size == 0 {
                    return Err(Error::InvalidStagerParams(
                        "page_size must be non-zero".to_string(),
                    ));
                }
                Ok(Arc::new(BinaryFileStager::new(path.clone(), *page_size)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_params_roundtrip() {
        let spec = StagerSpec::BinaryFile {
            path: PathBuf::from("/tmp/backing.dat"),
            page_size: 4096,
        };
        let params = spec.to_params();
        assert_eq!(StagerSpec::from_params(&params).unwrap(), spec);
    }

    #[test]
    fn test_bad_params_rejected() {
        assert!(StagerSpec::from_params("not json").is_err());
        let zero_page = StagerSpec::BinaryFile {
            path: PathBuf::from("/tmp/x"),
            page_size: 0,
        };
        assert!(zero_page.build().is_err());
    }
}
