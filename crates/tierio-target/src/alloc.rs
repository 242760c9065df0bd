//! Extent allocation for target capacity
//!
//! First-fit free-list allocator. Allocation may return less than asked for
//! when the target is low on space; the blob engine spills the shortfall to
//! the next tier. Freed extents are coalesced with their neighbors.

use crate::Block;

/// A free byte range on a target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    /// Starting byte offset
    pub offset: u64,
    /// Length in bytes
    pub size: u64,
}

impl Extent {
    /// Create a new extent
    #[must_use]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Ending byte offset (exclusive)
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Free-list allocator over a target's byte space
#[derive(Debug)]
pub struct ExtentAllocator {
    /// Free extents, sorted by offset, non-adjacent
    free_list: Vec<Extent>,
    /// Total capacity in bytes
    capacity: u64,
    /// Bytes currently free
    free_bytes: u64,
    /// Maximum size of a returned block; 0 means unsplit
    max_block: u64,
}

impl ExtentAllocator {
    /// Create an allocator over `capacity` bytes, all free.
    ///
    /// `max_block` caps the size of individual returned blocks (the largest
    /// configured slab size); 0 disables splitting.
    #[must_use]
    pub fn new(capacity: u64, max_block: u64) -> Self {
        let free_list = if capacity > 0 {
            vec![Extent::new(0, capacity)]
        } else {
            Vec::new()
        };
        Self {
            free_list,
            capacity,
            free_bytes: capacity,
            max_block,
        }
    }

    /// Total capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently free
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// Allocate up to `size` bytes.
    ///
    /// Returns zero or more blocks totalling at most `size`; a short result
    /// means the allocator ran out of space.
    pub fn allocate(&mut self, size: u64) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut remaining = size;
        while remaining > 0 {
            let Some(extent) = self.free_list.first_mut() else {
                break;
            };
            let take = remaining.min(extent.size);
            let offset = extent.offset;
            extent.offset += take;
            extent.size -= take;
            if extent.size == 0 {
                self.free_list.remove(0);
            }
            self.free_bytes -= take;
            remaining -= take;
            self.push_blocks(&mut blocks, offset, take);
        }
        blocks
    }

    /// Split `size` bytes at `offset` into blocks of at most `max_block`
    fn push_blocks(&self, blocks: &mut Vec<Block>, mut offset: u64, mut size: u64) {
        let chunk = if self.max_block > 0 { self.max_block } else { size };
        while size > 0 {
            let take = size.min(chunk);
            blocks.push(Block::new(offset, take));
            offset += take;
            size -= take;
        }
    }

    /// Return a block's bytes to the free pool, coalescing neighbors.
    ///
    /// Double frees violate the allocator's invariants and panic.
    pub fn free(&mut self, block: &Block) {
        if block.size == 0 {
            return;
        }
        let extent = Extent::new(block.offset, block.size);
        let idx = self
            .free_list
            .partition_point(|e| e.offset < extent.offset);
        let overlaps_prev = idx > 0 && self.free_list[idx - 1].end() > extent.offset;
        let overlaps_next = idx < self.free_list.len() && extent.end() > self.free_list[idx].offset;
        assert!(
            !overlaps_prev && !overlaps_next,
            "double free of extent at offset {}",
            extent.offset
        );
        self.free_list.insert(idx, extent);
        self.free_bytes += extent.size;
        self.coalesce(idx);
    }

    fn coalesce(&mut self, idx: usize) {
        // Merge with the following extent first so `idx` stays valid.
        if idx + 1 < self.free_list.len() && self.free_list[idx].end() == self.free_list[idx + 1].offset
        {
            self.free_list[idx].size += self.free_list[idx + 1].size;
            self.free_list.remove(idx + 1);
        }
        if idx > 0 && self.free_list[idx - 1].end() == self.free_list[idx].offset {
            self.free_list[idx - 1].size += self.free_list[idx].size;
            self.free_list.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_all() {
        let mut alloc = ExtentAllocator::new(100, 0);
        let blocks = alloc.allocate(100);
        assert_eq!(blocks, vec![Block::new(0, 100)]);
        assert_eq!(alloc.free_bytes(), 0);
        assert!(alloc.allocate(1).is_empty());
    }

    #[test]
    fn test_partial_allocation() {
        let mut alloc = ExtentAllocator::new(64, 0);
        let blocks = alloc.allocate(128);
        assert_eq!(blocks.iter().map(|b| b.size).sum::<u64>(), 64);
        assert_eq!(alloc.free_bytes(), 0);
    }

    #[test]
    fn test_free_and_reuse() {
        let mut alloc = ExtentAllocator::new(100, 0);
        let blocks = alloc.allocate(100);
        alloc.free(&blocks[0]);
        assert_eq!(alloc.free_bytes(), 100);
        let again = alloc.allocate(100);
        assert_eq!(again, vec![Block::new(0, 100)]);
    }

    #[test]
    fn test_coalescing() {
        let mut alloc = ExtentAllocator::new(300, 100);
        let blocks = alloc.allocate(300);
        assert_eq!(blocks.len(), 3);
        // Free out of order; the free list must still collapse to one extent.
        alloc.free(&blocks[2]);
        alloc.free(&blocks[0]);
        alloc.free(&blocks[1]);
        assert_eq!(alloc.free_bytes(), 300);
        let again = alloc.allocate(300);
        assert_eq!(again.iter().map(|b| b.size).sum::<u64>(), 300);
    }

    #[test]
    fn test_slab_splitting() {
        let mut alloc = ExtentAllocator::new(1024, 256);
        let blocks = alloc.allocate(1000);
        assert_eq!(blocks.len(), 4);
        assert!(blocks.iter().all(|b| b.size <= 256));
        assert_eq!(blocks.iter().map(|b| b.size).sum::<u64>(), 1000);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let mut alloc = ExtentAllocator::new(100, 0);
        let blocks = alloc.allocate(50);
        alloc.free(&blocks[0]);
        alloc.free(&blocks[0]);
    }
}
