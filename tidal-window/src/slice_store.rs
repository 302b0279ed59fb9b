use parking_lot::Mutex;

use tidal_types::{Record, SliceMetaData, TimestampMs};

use crate::error::WindowError;
use crate::Aggregator;

struct Inner<P> {
    slices: Vec<SliceMetaData>,
    partials: Vec<P>,
}

/// Per-(key, thread) ordered sequence of slices paired with partial
/// aggregates (§3, §4.5). Every mutating call takes the store's own lock;
/// callers never need to coordinate locking externally, so the invariants
/// "slices contiguous and sorted" and "`slices.len() == partials.len()`"
/// hold at every observable point.
pub struct SliceStore<A: Aggregator> {
    aggregator: A,
    inner: Mutex<Inner<A::Partial>>,
}

impl<A: Aggregator> SliceStore<A> {
    pub fn new(aggregator: A) -> Self {
        Self {
            aggregator,
            inner: Mutex::new(Inner {
                slices: Vec::new(),
                partials: Vec::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the slice whose `[start, end)` contains `ts`. A miss means
    /// the caller failed to append slices up to `ts` first; per §9 this is
    /// treated as a fatal precondition violation, not the source's silent
    /// "return 0" behavior.
    pub fn get_slice_index_by_ts(&self, ts: TimestampMs) -> Result<usize, WindowError> {
        let inner = self.inner.lock();
        inner
            .slices
            .iter()
            .position(|s| s.contains(ts))
            .ok_or(WindowError::SliceIndexMiss {
                ts,
                slice_count: inner.slices.len(),
            })
    }

    /// Appends a new slice at the tail, growing the partial-aggregate vector
    /// with the algebra's identity element. The caller is responsible for
    /// `meta.start_ts()` being contiguous with the current last slice.
    pub fn append_slice(&self, meta: SliceMetaData) {
        let mut inner = self.inner.lock();
        debug_assert!(
            inner
                .slices
                .last()
                .map(|last| meta.start_ts() >= last.end_ts())
                .unwrap_or(true),
            "appended slice must not overlap the current tail"
        );
        inner.slices.push(meta);
        inner.partials.push(self.aggregator.identity());
    }

    /// Inserts a new slice at the head, growing the partial-aggregate vector
    /// in lock-step. Used when a late-arriving record needs a slice earlier
    /// than any currently retained.
    pub fn prepend_slice(&self, meta: SliceMetaData) {
        let mut inner = self.inner.lock();
        debug_assert!(
            inner
                .slices
                .first()
                .map(|first| meta.end_ts() <= first.start_ts())
                .unwrap_or(true),
            "prepended slice must not overlap the current head"
        );
        inner.slices.insert(0, meta);
        inner.partials.insert(0, self.aggregator.identity());
    }

    pub fn increment_record_cnt(&self, idx: usize) {
        let mut inner = self.inner.lock();
        inner.slices[idx].increment_record_count();
    }

    /// Lifts `record` through the algebra and combines it into slice `idx`'s
    /// partial aggregate, then bumps that slice's tuple count.
    pub fn update(&self, idx: usize, record: &Record) {
        let mut inner = self.inner.lock();
        let lifted = self.aggregator.lift(record);
        inner.partials[idx] = self.aggregator.combine(&inner.partials[idx], &lifted);
        inner.slices[idx].increment_record_count();
    }

    /// Evicts every slice whose `end_ts <= watermark` (§9: fixing the
    /// source's `pos`-named-but-`endTs`-compared bug by spec-ing the correct
    /// comparison directly). On return, the first retained slice's `end_ts`
    /// is strictly greater than `watermark`.
    pub fn remove_slices_until(&self, watermark: TimestampMs) {
        let mut inner = self.inner.lock();
        let cut = inner
            .slices
            .iter()
            .position(|s| s.end_ts() > watermark)
            .unwrap_or(inner.slices.len());
        inner.slices.drain(0..cut);
        inner.partials.drain(0..cut);
    }

    /// Folds the partial aggregates of every slice whose range falls inside
    /// `[start, end)` and finalizes the result. Used when a window closes.
    pub fn fold_window(&self, start: TimestampMs, end: TimestampMs) -> tidal_types::Value {
        let inner = self.inner.lock();
        let mut acc = self.aggregator.identity();
        for (slice, partial) in inner.slices.iter().zip(inner.partials.iter()) {
            if slice.start_ts() >= start && slice.end_ts() <= end {
                acc = self.aggregator.combine(&acc, partial);
            }
        }
        self.aggregator.finalize(&acc)
    }

    pub fn slices(&self) -> Vec<SliceMetaData> {
        self.inner.lock().slices.clone()
    }

    /// Like [`fold_window`](Self::fold_window) but returns the unfinalized
    /// partial (§4.7): a distributed combiner merges these across workers
    /// before any one of them calls `finalize`.
    pub fn fold_window_partial(&self, start: TimestampMs, end: TimestampMs) -> A::Partial {
        let inner = self.inner.lock();
        let mut acc = self.aggregator.identity();
        for (slice, partial) in inner.slices.iter().zip(inner.partials.iter()) {
            if slice.start_ts() >= start && slice.end_ts() <= end {
                acc = self.aggregator.combine(&acc, partial);
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SumAggregator;
    use tidal_types::Value;

    fn record(ts: u64, value: u64) -> Record {
        Record::new("ts")
            .with_field("ts", Value::U64(ts))
            .with_field("value", Value::U64(value))
    }

    #[test]
    fn append_grows_slices_and_partials_in_lockstep() {
        let store = SliceStore::new(SumAggregator {
            field: "value".into(),
        });
        store.append_slice(SliceMetaData::new(0, 1000));
        store.append_slice(SliceMetaData::new(1000, 2000));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn miss_on_lookup_is_an_error_not_a_silent_zero() {
        let store = SliceStore::new(SumAggregator {
            field: "value".into(),
        });
        store.append_slice(SliceMetaData::new(0, 1000));
        assert!(matches!(
            store.get_slice_index_by_ts(5000),
            Err(WindowError::SliceIndexMiss { .. })
        ));
    }

    #[test]
    fn remove_slices_until_retains_first_slice_ending_after_watermark() {
        let store = SliceStore::new(SumAggregator {
            field: "value".into(),
        });
        store.append_slice(SliceMetaData::new(0, 1000));
        store.append_slice(SliceMetaData::new(1000, 2000));
        store.append_slice(SliceMetaData::new(2000, 3000));

        store.remove_slices_until(1500);
        let slices = store.slices();
        assert_eq!(slices.len(), 2);
        assert!(slices[0].end_ts() > 1500);
    }

    #[test]
    fn fold_window_sums_only_slices_within_range() {
        let store = SliceStore::new(SumAggregator {
            field: "value".into(),
        });
        store.append_slice(SliceMetaData::new(0, 1000));
        store.append_slice(SliceMetaData::new(1000, 2000));

        let idx0 = store.get_slice_index_by_ts(500).unwrap();
        let idx1 = store.get_slice_index_by_ts(1500).unwrap();
        store.update(idx0, &record(500, 3));
        store.update(idx1, &record(1500, 5));

        assert_eq!(store.fold_window(0, 1000), Value::F64(3.0));
        assert_eq!(store.fold_window(0, 2000), Value::F64(8.0));
    }
}
