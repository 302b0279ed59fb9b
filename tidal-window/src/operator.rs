use dashmap::DashMap;
use tracing::trace;

use tidal_types::{GroupKey, Record, SliceMetaData, TimestampMs, Value};

use crate::definition::WindowDefinition;
use crate::error::WindowError;
use crate::keyed_store::KeyedSliceStore;
use crate::Aggregator;

/// One materialized window result: `(start, end, key, value)` (§4.5). `key`
/// is `None` for non-keyed windows (global aggregation with exactly one
/// result per window).
#[derive(Clone, Debug, PartialEq)]
pub struct WindowResult {
    pub start: TimestampMs,
    pub end: TimestampMs,
    pub key: Option<GroupKey>,
    pub value: Value,
}

/// A window result before its aggregator's `finalize` runs (§4.7): what this
/// worker contributes to a downstream [`PartialAggregateCombiner`](crate::PartialAggregateCombiner)
/// when the window it belongs to spans several workers.
#[derive(Clone, Debug)]
pub struct PartialWindowResult<P> {
    pub start: TimestampMs,
    pub end: TimestampMs,
    pub key: Option<GroupKey>,
    pub partial: P,
}

/// Returns the `GroupKey` used internally for non-keyed (global) windows,
/// so a single [`SliceStore`](crate::SliceStore) backs the whole operator.
fn global_key() -> GroupKey {
    GroupKey::from_values(Vec::new())
}

/// Ties a [`WindowDefinition`] and a [`KeyedSliceStore`] together into the
/// watermark-driven operator described in §4.5: records are lifted into the
/// slice covering their timestamp, and on each watermark advance every
/// window whose end has passed is folded, emitted, and its slices evicted.
pub struct WindowOperator<A: Aggregator + Clone> {
    definition: WindowDefinition,
    keyed: KeyedSliceStore<A>,
    keyed_output: bool,
    next_window_start: DashMap<GroupKey, TimestampMs>,
}

impl<A: Aggregator + Clone> WindowOperator<A> {
    /// A windowed aggregation with one result per distinct key per window.
    pub fn keyed(aggregator: A, definition: WindowDefinition) -> Self {
        Self {
            definition,
            keyed: KeyedSliceStore::new(aggregator),
            keyed_output: true,
            next_window_start: DashMap::new(),
        }
    }

    /// A windowed aggregation over the whole stream, one result per window.
    pub fn non_keyed(aggregator: A, definition: WindowDefinition) -> Self {
        Self {
            definition,
            keyed: KeyedSliceStore::new(aggregator),
            keyed_output: false,
            next_window_start: DashMap::new(),
        }
    }

    pub fn definition(&self) -> WindowDefinition {
        self.definition
    }

    /// Lifts `record` (whose event-time timestamp is `record.event_time()`)
    /// into the slice covering it, creating slices as needed to maintain
    /// contiguity, then updates that slice's partial aggregate.
    pub fn execute(&self, key: GroupKey, record: &Record) -> Result<(), WindowError> {
        let ts = record.event_time();
        let store = self.keyed.store_for(&key);
        self.ensure_slice_for(&store, ts);
        let idx = store.get_slice_index_by_ts(ts)?;
        store.update(idx, record);

        self.next_window_start.entry(key).or_insert_with(|| {
            let (slice_start, _) = self.definition.slice_bounds(ts);
            *self
                .definition
                .window_starts_for_slice(slice_start)
                .iter()
                .min()
                .expect("a slice belongs to at least one window")
        });
        Ok(())
    }

    pub fn execute_non_keyed(&self, record: &Record) -> Result<(), WindowError> {
        self.execute(global_key(), record)
    }

    /// Extends `store`'s slice sequence, if needed, so that a slice covering
    /// `ts` exists and the sequence remains contiguous (§4.5: the operator,
    /// not the store, owns the append/prepend decision).
    fn ensure_slice_for(&self, store: &crate::SliceStore<A>, ts: TimestampMs) {
        let (slice_start, slice_end) = self.definition.slice_bounds(ts);
        let slide = self.definition.slide_ms();

        match store.slices().last().map(|s| s.end_ts()) {
            None => store.append_slice(SliceMetaData::new(slice_start, slice_end)),
            Some(tail_end) if tail_end <= slice_start => {
                let mut cursor = tail_end;
                while cursor < slice_end {
                    store.append_slice(SliceMetaData::new(cursor, cursor + slide));
                    cursor += slide;
                }
            }
            _ => {
                // A slice at or covering `slice_start` already exists
                // (either this or an earlier, still-unevicted, record
                // landed there first); nothing to append.
            }
        }
    }

    /// Folds and emits every window whose end has passed `watermark` and
    /// has not yet been emitted, for every key with data, then evicts
    /// slices no longer reachable by any future window.
    pub fn on_watermark(&self, watermark: TimestampMs) -> Vec<WindowResult> {
        let mut results = Vec::new();
        let size = self.definition.size_ms();
        let slide = self.definition.slide_ms();

        for key in self.keyed.keys() {
            let store = self.keyed.store_for(&key);
            let mut next_start = match self.next_window_start.get(&key) {
                Some(entry) => *entry,
                None => continue,
            };

            while next_start + size <= watermark {
                let value = store.fold_window(next_start, next_start + size);
                trace!(start = next_start, end = next_start + size, "window closed");
                results.push(WindowResult {
                    start: next_start,
                    end: next_start + size,
                    key: self.keyed_output.then(|| key.clone()),
                    value,
                });
                next_start += slide;
            }

            self.next_window_start.insert(key, next_start);
            store.remove_slices_until(watermark);
        }

        results
    }

    /// Same traversal as [`on_watermark`](Self::on_watermark) but leaves each
    /// window's aggregate unfinalized, for a sub-plan whose window spans more
    /// than one worker and feeds a [`PartialAggregateCombiner`](crate::PartialAggregateCombiner)
    /// instead of emitting directly (§4.7).
    pub fn on_watermark_partial(&self, watermark: TimestampMs) -> Vec<PartialWindowResult<A::Partial>> {
        let mut results = Vec::new();
        let size = self.definition.size_ms();
        let slide = self.definition.slide_ms();

        for key in self.keyed.keys() {
            let store = self.keyed.store_for(&key);
            let mut next_start = match self.next_window_start.get(&key) {
                Some(entry) => *entry,
                None => continue,
            };

            while next_start + size <= watermark {
                let partial = store.fold_window_partial(next_start, next_start + size);
                results.push(PartialWindowResult {
                    start: next_start,
                    end: next_start + size,
                    key: self.keyed_output.then(|| key.clone()),
                    partial,
                });
                next_start += slide;
            }

            self.next_window_start.insert(key, next_start);
            store.remove_slices_until(watermark);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{CountAggregator, SumAggregator};

    fn rec(ts: u64, id: u64, value: u64) -> Record {
        Record::new("ts")
            .with_field("ts", Value::U64(ts))
            .with_field("id", Value::U64(id))
            .with_field("value", Value::U64(value))
    }

    /// Scenario 1 (§8): keyed tumbling sum.
    #[test]
    fn keyed_tumbling_sum_over_two_windows() {
        let op = WindowOperator::keyed(
            SumAggregator {
                field: "value".into(),
            },
            WindowDefinition::tumbling(1000),
        );
        let key = GroupKey::single(Value::U64(1));
        for (value, ts) in [(1u64, 1000u64), (1, 1200), (2, 1900), (3, 2100)] {
            op.execute(key.clone(), &rec(ts, 1, value)).unwrap();
        }

        let mut results = op.on_watermark(3000);
        results.sort_by_key(|r| r.start);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].start, 1000);
        assert_eq!(results[0].end, 2000);
        assert_eq!(results[0].value, Value::F64(4.0));
        assert_eq!(results[1].start, 2000);
        assert_eq!(results[1].end, 3000);
        assert_eq!(results[1].value, Value::F64(3.0));
    }

    /// Scenario 3 (§8): non-keyed tumbling count.
    #[test]
    fn non_keyed_tumbling_count_over_two_windows() {
        let op = WindowOperator::non_keyed(CountAggregator, WindowDefinition::tumbling(1000));
        for ts in [1000u64, 1500, 1999, 2000, 2500] {
            op.execute_non_keyed(&rec(ts, 0, 1)).unwrap();
        }

        let mut results = op.on_watermark(3000);
        results.sort_by_key(|r| r.start);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].value, Value::U64(3));
        assert_eq!(results[1].value, Value::U64(2));
        assert!(results.iter().all(|r| r.key.is_none()));
    }

    /// Reduced form of scenario 2 (§8): sliding sum, one key, one record per
    /// second for the first 10 seconds only (the full scenario runs to 30s
    /// across multiple keys; this checks the windowing math in isolation).
    #[test]
    fn sliding_sum_emits_five_overlapping_windows() {
        let op = WindowOperator::keyed(
            SumAggregator {
                field: "value".into(),
            },
            WindowDefinition::sliding(10_000, 5_000),
        );
        let key = GroupKey::single(Value::U64(7));
        for ts in (0..10_000u64).step_by(1000) {
            op.execute(key.clone(), &rec(ts, 7, 1)).unwrap();
        }

        let mut results = op.on_watermark(30_000);
        results.sort_by_key(|r| r.start);
        let starts: Vec<u64> = results.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![0, 5_000, 10_000, 15_000, 20_000]);
        assert_eq!(results[0].value, Value::F64(10.0)); // [0,10000): 10 records
        assert_eq!(results[1].value, Value::F64(5.0)); // [5000,15000): 5 records
        assert_eq!(results[2].value, Value::F64(0.0)); // [10000,20000): none
    }

    #[test]
    fn watermark_eviction_preserves_store_invariants() {
        let op = WindowOperator::non_keyed(CountAggregator, WindowDefinition::tumbling(1000));
        op.execute_non_keyed(&rec(500, 0, 1)).unwrap();
        op.execute_non_keyed(&rec(1500, 0, 1)).unwrap();
        let _ = op.on_watermark(2000);

        let store = op.keyed.store_for(&global_key());
        for slice in store.slices() {
            assert!(slice.end_ts() > 2000);
        }
    }
}
