//! Binary file stager
//!
//! Maps the blobs of one tag onto fixed-size pages of a backing file. The
//! filesystem adapters name each blob `<page>.<offset>` where `<page>` is
//! the page index and `<offset>` the absolute byte offset of that page;
//! [`PageSlot`] converts between the two.

use crate::{SizeUpdate, Stager};
use async_trait::async_trait;
use bytes::Bytes;
use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use tierio_common::{Result, TagId, UpdateSizeMode};
use tracing::{debug, warn};

/// A blob's position in the backing file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSlot {
    /// Page index
    pub page: u64,
    /// Absolute byte offset of the page
    pub offset: u64,
}

impl PageSlot {
    /// Slot for page `page` under `page_size`
    #[must_use]
    pub const fn new(page: u64, page_size: u64) -> Self {
        Self {
            page,
            offset: page * page_size,
        }
    }

    /// Render the adapter blob name for this slot
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}.{}", self.page, self.offset)
    }

    /// Recover the slot from an adapter blob name.
    ///
    /// Accepts `<page>.<offset>` and bare `<page>` (offset derived from
    /// `page_size`); anything else does not map into the store.
    #[must_use]
    pub fn decode(blob_name: &str, page_size: u64) -> Option<Self> {
        match blob_name.split_once('.') {
            Some((page, offset)) => {
                let page = page.parse().ok()?;
                let offset = offset.parse().ok()?;
                Some(Self { page, offset })
            }
            None => {
                let page = blob_name.parse().ok()?;
                Some(Self::new(page, page_size))
            }
        }
    }
}

/// Stager backed by a plain binary file, one page per blob
pub struct BinaryFileStager {
    path: PathBuf,
    page_size: u64,
}

impl BinaryFileStager {
    /// Create a stager over `path` with `page_size`-byte pages
    #[must_use]
    pub const fn new(path: PathBuf, page_size: u64) -> Self {
        Self { path, page_size }
    }
}

#[async_trait]
impl Stager for BinaryFileStager {
    fn kind(&self) -> &'static str {
        "binary_file"
    }

    async fn stage_in(&self, tag_id: TagId, blob_name: &str, _score: f32) -> Result<Option<Bytes>> {
        let Some(slot) = PageSlot::decode(blob_name, self.page_size) else {
            warn!(%tag_id, blob_name, "blob name does not map into the backing file");
            return Ok(None);
        };
        let path = self.path.clone();
        let page_size = self.page_size;
        let data = tokio::task::spawn_blocking(move || -> std::io::Result<Option<Vec<u8>>> {
            let file = match std::fs::File::open(&path) {
                Ok(file) => file,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err),
            };
            let file_len = file.metadata()?.len();
            if slot.offset >= file_len {
                return Ok(None);
            }
            // The final page of the file may be short.
            let len = page_size.min(file_len - slot.offset) as usize;
            let mut buf = vec![0u8; len];
            file.read_exact_at(&mut buf, slot.offset)?;
            Ok(Some(buf))
        })
        .await
        .expect("blocking stage-in task panicked")?;

        debug!(%tag_id, blob_name, page = slot.page,
            bytes = data.as_ref().map_or(0, Vec::len), "staged in");
        Ok(data.map(Bytes::from))
    }

    async fn stage_out(&self, tag_id: TagId, blob_name: &str, data: Bytes) -> Result<()> {
        let Some(slot) = PageSlot::decode(blob_name, self.page_size) else {
            warn!(%tag_id, blob_name, "blob name does not map into the backing file");
            return Ok(());
        };
        let path = self.path.clone();
        let len = data.len();
        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new().create(true).write(true).open(&path)?;
            file.write_all_at(&data, slot.offset)
        })
        .await
        .expect("blocking stage-out task panicked")?;

        debug!(%tag_id, blob_name, page = slot.page, bytes = len, "staged out");
        Ok(())
    }

    fn update_size(&self, blob_name: &str, off: u64, len: u64) -> Option<SizeUpdate> {
        let slot = PageSlot::decode(blob_name, self.page_size)?;
        Some(SizeUpdate {
            value: (slot.offset + off + len) as i64,
            mode: UpdateSizeMode::Cap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slot_codec() {
        let slot = PageSlot::new(3, 4096);
        assert_eq!(slot.offset, 12288);
        assert_eq!(slot.encode(), "3.12288");
        assert_eq!(PageSlot::decode("3.12288", 4096), Some(slot));
        assert_eq!(PageSlot::decode("3", 4096), Some(slot));
        assert_eq!(PageSlot::decode("not-a-page", 4096), None);
    }

    #[tokio::test]
    async fn test_stage_out_then_in() {
        let dir = tempfile::tempdir().unwrap();
        let stager = BinaryFileStager::new(dir.path().join("backing.dat"), 16);
        let tag = TagId::new(1, 0, 1);

        stager
            .stage_out(tag, "0.0", Bytes::from_static(b"from-disk"))
            .await
            .unwrap();
        let data = stager.stage_in(tag, "0.0", 1.0).await.unwrap().unwrap();
        assert_eq!(&data[..], b"from-disk");
    }

    #[tokio::test]
    async fn test_stage_in_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let stager = BinaryFileStager::new(dir.path().join("absent.dat"), 16);
        let data = stager.stage_in(TagId::null(), "0.0", 1.0).await.unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_stage_in_clamps_to_file_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.dat");
        std::fs::write(&path, b"0123456789").unwrap();
        let stager = BinaryFileStager::new(path, 8);

        // Page 1 starts at offset 8 with only two bytes behind it.
        let data = stager
            .stage_in(TagId::null(), "1.8", 1.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&data[..], b"89");

        // Page 2 starts past the end of the file.
        assert!(stager
            .stage_in(TagId::null(), "2.16", 1.0)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_size_caps_at_page_end() {
        let stager = BinaryFileStager::new(PathBuf::from("/tmp/x"), 4096);
        let update = stager.update_size("2.8192", 100, 50).unwrap();
        assert_eq!(update.value, 8342);
        assert_eq!(update.mode, UpdateSizeMode::Cap);
        assert!(stager.update_size("bogus", 0, 1).is_none());
    }
}
