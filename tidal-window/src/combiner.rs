use std::collections::HashMap;

use parking_lot::Mutex;

use tidal_types::{GroupKey, OriginId, TimestampMs};

use crate::operator::{PartialWindowResult, WindowResult};
use crate::Aggregator;

#[derive(Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    start: TimestampMs,
    end: TimestampMs,
    key: Option<GroupKey>,
}

struct PendingWindow<P> {
    partial: P,
    contributors: Vec<OriginId>,
}

/// Merges per-worker partial aggregates for windows that span more than one
/// worker (§4.7). Runs on at most one worker per shared query. Accepts
/// [`PartialWindowResult`]s tagged with the origin that produced them and
/// tracks each origin's watermark independently; a window is only finalized
/// and emitted once every known origin's watermark has passed the window's
/// end, matching the spec's "closed on every upstream origin" rule and §5's
/// "effective watermark is the minimum over all upstream origins."
pub struct PartialAggregateCombiner<A: Aggregator> {
    aggregator: A,
    pending: Mutex<HashMap<WindowKey, PendingWindow<A::Partial>>>,
    watermarks: Mutex<HashMap<OriginId, TimestampMs>>,
}

impl<A: Aggregator> PartialAggregateCombiner<A> {
    pub fn new(aggregator: A) -> Self {
        Self {
            aggregator,
            pending: Mutex::new(HashMap::new()),
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    /// Folds `result` from `origin` into the running merge for its
    /// `(window, key)`. Combining twice from the same origin for the same
    /// window is a caller error (one worker contributes at most one partial
    /// per window) but is tolerated here by re-combining, since `combine`
    /// is associative and idempotent re-delivery must not corrupt state.
    pub fn ingest(&self, origin: OriginId, result: PartialWindowResult<A::Partial>) {
        let window_key = WindowKey {
            start: result.start,
            end: result.end,
            key: result.key,
        };
        let mut pending = self.pending.lock();
        let entry = pending.entry(window_key).or_insert_with(|| PendingWindow {
            partial: self.aggregator.identity(),
            contributors: Vec::new(),
        });
        entry.partial = self.aggregator.combine(&entry.partial, &result.partial);
        if !entry.contributors.contains(&origin) {
            entry.contributors.push(origin);
        }
    }

    /// Records that `origin`'s watermark has advanced to `watermark`.
    /// Watermarks are monotonic per origin (§5); an out-of-order call is
    /// ignored rather than letting the effective watermark regress.
    pub fn advance_watermark(&self, origin: OriginId, watermark: TimestampMs) {
        let mut watermarks = self.watermarks.lock();
        let current = watermarks.entry(origin).or_insert(0);
        if watermark > *current {
            *current = watermark;
        }
    }

    /// The minimum watermark across every origin the combiner has heard
    /// from (§5). No known origins yields `0`: nothing can be closed yet.
    pub fn effective_watermark(&self) -> TimestampMs {
        self.watermarks.lock().values().copied().min().unwrap_or(0)
    }

    /// Finalizes and returns every pending window whose end has passed the
    /// effective watermark, removing them from the pending set. A window
    /// that never received a partial from one of the now-known origins is
    /// still drained once the effective watermark passes it: a stalled
    /// contributor the combiner has never heard a watermark from cannot
    /// hold back emission indefinitely, since `effective_watermark` only
    /// accounts for origins it has actually observed.
    pub fn drain_closed(&self) -> Vec<WindowResult> {
        let watermark = self.effective_watermark();
        let mut pending = self.pending.lock();
        let mut closed_keys = Vec::new();
        for window_key in pending.keys() {
            if window_key.end <= watermark {
                closed_keys.push(window_key.clone());
            }
        }

        closed_keys
            .into_iter()
            .map(|window_key| {
                let window = pending.remove(&window_key).expect("key just observed present");
                WindowResult {
                    start: window_key.start,
                    end: window_key.end,
                    key: window_key.key,
                    value: self.aggregator.finalize(&window.partial),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SumAggregator;
    use tidal_types::Value;

    #[test]
    fn window_closes_only_once_every_known_origin_advances_past_its_end() {
        let combiner = PartialAggregateCombiner::new(SumAggregator {
            field: "value".into(),
        });
        let key = Some(GroupKey::single(Value::U64(1)));

        combiner.ingest(
            OriginId(1),
            PartialWindowResult {
                start: 1000,
                end: 2000,
                key: key.clone(),
                partial: 4.0,
            },
        );
        combiner.ingest(
            OriginId(2),
            PartialWindowResult {
                start: 1000,
                end: 2000,
                key: key.clone(),
                partial: 3.0,
            },
        );

        combiner.advance_watermark(OriginId(1), 2500);
        assert!(combiner.drain_closed().is_empty(), "origin 2's watermark hasn't caught up");

        combiner.advance_watermark(OriginId(2), 1999);
        assert!(
            combiner.drain_closed().is_empty(),
            "effective watermark is min(2500, 1999) = 1999, still short of the window end"
        );

        combiner.advance_watermark(OriginId(2), 2000);
        let results = combiner.drain_closed();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, Value::F64(7.0));
    }

    #[test]
    fn a_drained_window_is_not_emitted_twice() {
        let combiner = PartialAggregateCombiner::new(SumAggregator {
            field: "value".into(),
        });
        combiner.ingest(
            OriginId(1),
            PartialWindowResult {
                start: 0,
                end: 1000,
                key: None,
                partial: 1.0,
            },
        );
        combiner.advance_watermark(OriginId(1), 1000);
        assert_eq!(combiner.drain_closed().len(), 1);
        assert!(combiner.drain_closed().is_empty());
    }
}
