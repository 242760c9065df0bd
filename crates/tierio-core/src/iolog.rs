//! Access-pattern log
//!
//! Bounded multi-producer ring of [`IoStat`] records for telemetry. The
//! ring assigns each record a monotonic sequence id; on overflow the oldest
//! entries are overwritten. Slots are independent short critical sections,
//! never held across a suspension point.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tierio_common::{BlobId, IoStat, IoType, TagId};

/// Bounded ring of access-pattern records
pub struct AccessPatternLog {
    slots: Vec<Mutex<Option<IoStat>>>,
    /// Next sequence id; ids start at 1 so `poll(0)` returns everything.
    next: AtomicU64,
}

impl AccessPatternLog {
    /// Create a ring with `depth` slots
    #[must_use]
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0, "ring depth must be non-zero");
        Self {
            slots: (0..depth).map(|_| Mutex::new(None)).collect(),
            next: AtomicU64::new(1),
        }
    }

    /// Ring depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Record one operation, returning its assigned id
    pub fn push(&self, op: IoType, blob_id: BlobId, tag_id: TagId, size: u64) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let slot = (id % self.slots.len() as u64) as usize;
        *self.slots[slot].lock() = Some(IoStat {
            op,
            blob_id,
            tag_id,
            size,
            id,
        });
        id
    }

    /// Records with `id > since_id`, ascending by id
    #[must_use]
    pub fn poll(&self, since_id: u64) -> Vec<IoStat> {
        let mut records: Vec<IoStat> = self
            .slots
            .iter()
            .filter_map(|slot| *slot.lock())
            .filter(|stat| stat.id > since_id)
            .collect();
        records.sort_by_key(|stat| stat.id);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_n(log: &AccessPatternLog, n: u64) {
        for i in 0..n {
            log.push(
                if i % 2 == 0 { IoType::Write } else { IoType::Read },
                BlobId::new(1, 0, i),
                TagId::new(1, 0, 1),
                i,
            );
        }
    }

    #[test]
    fn test_ids_monotonic_and_ordered() {
        let log = AccessPatternLog::new(16);
        push_n(&log, 5);
        let records = log.poll(0);
        assert_eq!(records.len(), 5);
        for (i, stat) in records.iter().enumerate() {
            assert_eq!(stat.id, i as u64 + 1);
        }
    }

    #[test]
    fn test_poll_since() {
        let log = AccessPatternLog::new(16);
        push_n(&log, 6);
        let records = log.poll(4);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 5);
        assert_eq!(records[1].id, 6);
    }

    #[test]
    fn test_overflow_overwrites_oldest() {
        let log = AccessPatternLog::new(4);
        assert_eq!(log.depth(), 4);
        push_n(&log, 10);
        let records = log.poll(0);
        assert_eq!(records.len(), 4);
        assert_eq!(
            records.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![7, 8, 9, 10]
        );
    }

    #[test]
    fn test_concurrent_producers() {
        use std::sync::Arc;
        let log = Arc::new(AccessPatternLog::new(1024));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        log.push(IoType::Write, BlobId::null(), TagId::null(), 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let records = log.poll(0);
        assert_eq!(records.len(), 400);
        // Strictly increasing ids regardless of producer interleaving.
        assert!(records.windows(2).all(|w| w[0].id < w[1].id));
    }
}
