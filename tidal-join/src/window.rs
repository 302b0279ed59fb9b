use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tidal_types::TimestampMs;

use crate::page::Entry;
use crate::partition::PartitionedTable;

/// Lifecycle of one [`HashJoinWindow`] (§3, §4.6). `Probing` means both
/// sides' watermarks have passed the window end and build tables are now
/// immutable; `Closed` means every partition has been probed and forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowPhase {
    Build,
    Probing,
    Closed,
}

/// Per-window build/probe state for one join instance (§3, §4.6): one
/// [`PartitionedTable`] per side, per-side watermark high-water marks, and a
/// claim bitmap so exactly one worker probes each partition.
pub struct HashJoinWindow {
    start: TimestampMs,
    end: TimestampMs,
    left: PartitionedTable,
    right: PartitionedTable,
    left_watermark: AtomicU64,
    right_watermark: AtomicU64,
    claimed: Vec<AtomicBool>,
    probed: Vec<AtomicBool>,
}

impl HashJoinWindow {
    pub fn new(start: TimestampMs, end: TimestampMs, num_partitions: usize, num_buckets: usize) -> Self {
        Self {
            start,
            end,
            left: PartitionedTable::new(num_partitions, num_buckets),
            right: PartitionedTable::new(num_partitions, num_buckets),
            left_watermark: AtomicU64::new(0),
            right_watermark: AtomicU64::new(0),
            claimed: (0..num_partitions).map(|_| AtomicBool::new(false)).collect(),
            probed: (0..num_partitions).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn start(&self) -> TimestampMs {
        self.start
    }

    pub fn end(&self) -> TimestampMs {
        self.end
    }

    pub fn contains(&self, ts: TimestampMs) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn insert_left(&self, key_hash: u64, entry: Entry) {
        self.left.insert(key_hash, entry);
    }

    pub fn insert_right(&self, key_hash: u64, entry: Entry) {
        self.right.insert(key_hash, entry);
    }

    pub fn left_table(&self) -> &PartitionedTable {
        &self.left
    }

    pub fn right_table(&self) -> &PartitionedTable {
        &self.right
    }

    pub fn num_partitions(&self) -> usize {
        self.left.num_partitions()
    }

    /// Advances this window's recorded high-water mark for `side`. Returns
    /// `true` exactly once: the first call (across both sides) after which
    /// both watermarks exceed `end`, i.e. the moment the window becomes
    /// eligible to transition Build→Probing.
    pub fn advance_watermark(&self, left: bool, watermark: TimestampMs) -> bool {
        let target = if left {
            &self.left_watermark
        } else {
            &self.right_watermark
        };
        target.fetch_max(watermark, Ordering::AcqRel);
        self.both_watermarks_past_end()
    }

    pub fn both_watermarks_past_end(&self) -> bool {
        self.left_watermark.load(Ordering::Acquire) > self.end
            && self.right_watermark.load(Ordering::Acquire) > self.end
    }

    /// Atomically claims partition `p` for probing; returns `true` only to
    /// the first caller (§4.6: "at most one worker at a time").
    pub fn claim_partition(&self, p: usize) -> bool {
        self.claimed[p]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn mark_partition_probed(&self, p: usize) {
        self.probed[p].store(true, Ordering::Release);
    }

    pub fn all_partitions_probed(&self) -> bool {
        self.probed.iter().all(|p| p.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_watermarks_past_end_requires_both_sides() {
        let window = HashJoinWindow::new(0, 1000, 2, 4);
        assert!(!window.advance_watermark(true, 1001));
        assert!(!window.both_watermarks_past_end());
        assert!(window.advance_watermark(false, 1001));
        assert!(window.both_watermarks_past_end());
    }

    #[test]
    fn claim_partition_succeeds_exactly_once() {
        let window = HashJoinWindow::new(0, 1000, 2, 4);
        assert!(window.claim_partition(0));
        assert!(!window.claim_partition(0));
        assert!(window.claim_partition(1));
    }

    #[test]
    fn all_partitions_probed_only_after_every_partition_marked() {
        let window = HashJoinWindow::new(0, 1000, 2, 4);
        assert!(!window.all_partitions_probed());
        window.mark_partition_probed(0);
        assert!(!window.all_partitions_probed());
        window.mark_partition_probed(1);
        assert!(window.all_partitions_probed());
    }
}
