use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use tidal_types::{OriginId, SequenceNumber};

/// Per-sub-plan statistics snapshot (§4.8): "a statistics snapshot per
/// sub-plan (buffers processed, tuples processed, bytes processed,
/// per-origin high-water sequence numbers)".
#[derive(Clone, Debug)]
pub struct StatsSnapshot {
    pub buffers_processed: u64,
    pub tuples_processed: u64,
    pub bytes_processed: u64,
    pub high_water_sequence: Vec<(OriginId, SequenceNumber)>,
}

/// Live counters backing one sub-plan's [`StatsSnapshot`]. Updated from the
/// worker thread executing that sub-plan's tasks; read from any thread via
/// [`SubPlanStats::snapshot`].
#[derive(Default)]
pub struct SubPlanStats {
    buffers_processed: AtomicU64,
    tuples_processed: AtomicU64,
    bytes_processed: AtomicU64,
    high_water_sequence: DashMap<OriginId, SequenceNumber>,
}

impl SubPlanStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one processed data task. `bytes` is the buffer's capacity
    /// (the fixed allocation unit, §4.1), not its live payload length.
    pub fn record_buffer(&self, origin_id: OriginId, sequence: SequenceNumber, tuples: u64, bytes: u64) {
        self.buffers_processed.fetch_add(1, Ordering::Relaxed);
        self.tuples_processed.fetch_add(tuples, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.high_water_sequence
            .entry(origin_id)
            .and_modify(|hwm| *hwm = SequenceNumber(hwm.0.max(sequence.0)))
            .or_insert(sequence);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            buffers_processed: self.buffers_processed.load(Ordering::Relaxed),
            tuples_processed: self.tuples_processed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            high_water_sequence: self
                .high_water_sequence
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_water_sequence_tracks_the_max_per_origin() {
        let stats = SubPlanStats::new();
        stats.record_buffer(OriginId(1), SequenceNumber(3), 10, 64);
        stats.record_buffer(OriginId(1), SequenceNumber(7), 10, 64);
        stats.record_buffer(OriginId(1), SequenceNumber(5), 10, 64);
        stats.record_buffer(OriginId(2), SequenceNumber(1), 5, 64);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.buffers_processed, 4);
        assert_eq!(snapshot.tuples_processed, 35);
        assert_eq!(snapshot.bytes_processed, 256);

        let hwm: std::collections::HashMap<_, _> = snapshot.high_water_sequence.into_iter().collect();
        assert_eq!(hwm[&OriginId(1)], SequenceNumber(7));
        assert_eq!(hwm[&OriginId(2)], SequenceNumber(1));
    }
}
