use std::sync::Arc;

use tidal_types::{Record, TimestampMs, Value};
use tidal_window::WindowDefinition;

use crate::error::JoinError;
use crate::handler::WindowHandler;
use crate::page::Entry;
use crate::window::HashJoinWindow;

/// Which build side a record belongs to (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

/// One matched pair, materialized as `(window.start, window.end, joinKey,
/// leftFields.., rightFields..)` (§4.6).
#[derive(Clone, Debug)]
pub struct JoinOutput {
    pub window_start: TimestampMs,
    pub window_end: TimestampMs,
    pub join_key: Value,
    pub record: Record,
}

/// The streaming hash join operator (§4.6): builds per-window, per-partition
/// hash tables from both input sides and probes them once both sides'
/// watermarks have passed the window end, emitting exactly one output per
/// matching pair.
pub struct StreamingHashJoinOperator {
    handler: WindowHandler,
    left_key_field: String,
    right_key_field: String,
}

impl StreamingHashJoinOperator {
    pub fn new(
        definition: WindowDefinition,
        num_partitions: usize,
        num_buckets: usize,
        left_key_field: impl Into<String>,
        right_key_field: impl Into<String>,
    ) -> Self {
        Self {
            handler: WindowHandler::new(definition, num_partitions, num_buckets),
            left_key_field: left_key_field.into(),
            right_key_field: right_key_field.into(),
        }
    }

    pub fn definition(&self) -> WindowDefinition {
        self.handler.definition()
    }

    pub fn open_window_count(&self) -> usize {
        self.handler.open_window_count()
    }

    fn key_field(&self, side: JoinSide) -> &str {
        match side {
            JoinSide::Left => &self.left_key_field,
            JoinSide::Right => &self.right_key_field,
        }
    }

    /// Inserts `record` into every window instance it belongs to, on `side`'s
    /// build table (§4.6: a sliding-window record fans out to every
    /// overlapping window instance).
    pub fn execute(&self, side: JoinSide, record: Record) -> Result<(), JoinError> {
        let field = self.key_field(side);
        let key = record
            .get(field)
            .ok_or_else(|| JoinError::MissingJoinKey { side: side_name(side), field: field.to_string() })?;
        let key_hash = key.stable_hash();
        let entry = Entry { key_hash, record: Arc::new(record.clone()) };
        for window in self.handler.get_or_create_covering(record.event_time()) {
            match side {
                JoinSide::Left => window.insert_left(key_hash, entry.clone()),
                JoinSide::Right => window.insert_right(key_hash, entry.clone()),
            }
        }
        Ok(())
    }

    /// Advances `side`'s watermark on every currently open window, returning
    /// those that just became eligible for probing (both watermarks now past
    /// the window end).
    pub fn advance_watermark(&self, side: JoinSide, watermark: TimestampMs) -> Vec<Arc<HashJoinWindow>> {
        let is_left = side == JoinSide::Left;
        self.handler
            .open_windows()
            .into_iter()
            .filter(|window| window.advance_watermark(is_left, watermark))
            .collect()
    }

    /// Probes partition `p` of `window`: claims it (at most one caller
    /// succeeds), scans matching bucket chains on both sides, and emits one
    /// [`JoinOutput`] per pair whose join keys compare equal (hash equality
    /// alone is checked first as a cheap filter, then the actual values to
    /// rule out collisions). Retires the window once every partition has been
    /// probed.
    pub fn probe_partition(&self, window: &Arc<HashJoinWindow>, p: usize) -> Result<Vec<JoinOutput>, JoinError> {
        if !window.claim_partition(p) {
            return Err(JoinError::PartitionNotClaimable {
                window_start: window.start(),
                window_end: window.end(),
                partition: p,
            });
        }

        let left_field = self.left_key_field.clone();
        let right_field = self.right_key_field.clone();
        let mut out = Vec::new();

        window.left_table().with_partition(p, |left| {
            window.right_table().with_partition(p, |right| {
                for bucket in 0..left.num_buckets() {
                    let left_entries: Vec<&Entry> = left.chain(bucket).iter().flat_map(|page| page.entries()).collect();
                    let right_entries: Vec<&Entry> =
                        right.chain(bucket).iter().flat_map(|page| page.entries()).collect();
                    for l in &left_entries {
                        let Some(left_key) = l.record.get(&left_field) else { continue };
                        for r in &right_entries {
                            if l.key_hash != r.key_hash {
                                continue;
                            }
                            let Some(right_key) = r.record.get(&right_field) else { continue };
                            if left_key != right_key {
                                continue;
                            }
                            let record = l.record.concat("left_", &r.record, "right_");
                            out.push(JoinOutput {
                                window_start: window.start(),
                                window_end: window.end(),
                                join_key: left_key.clone(),
                                record,
                            });
                        }
                    }
                }
            });
        });

        window.mark_partition_probed(p);
        Ok(out)
    }

    pub fn retire_if_drained(&self, window_start: TimestampMs) {
        self.handler.retire_if_drained(window_start);
    }

    pub fn windows_covering(&self, ts: TimestampMs) -> Vec<Arc<HashJoinWindow>> {
        self.handler.get_or_create_covering(ts)
    }
}

fn side_name(side: JoinSide) -> &'static str {
    match side {
        JoinSide::Left => "left",
        JoinSide::Right => "right",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_window::WindowDefinition;

    fn rec(ts: u64, key: u64, value: u64) -> Record {
        Record::new("ts")
            .with_field("ts", Value::U64(ts))
            .with_field("key", Value::U64(key))
            .with_field("value", Value::U64(value))
    }

    fn probe_window(op: &StreamingHashJoinOperator, window: &Arc<HashJoinWindow>) -> Vec<JoinOutput> {
        let mut out = Vec::new();
        for p in 0..window.num_partitions() {
            out.extend(op.probe_partition(window, p).unwrap());
        }
        out
    }

    #[test]
    fn streaming_hash_join_emits_exactly_one_match_per_matching_pair() {
        // Spec scenario 4: a 1s tumbling window, two matching pairs on key 1 and
        // key 2, one unmatched row on each side.
        let op = StreamingHashJoinOperator::new(WindowDefinition::tumbling(1000), 1, 8, "key", "key");

        op.execute(JoinSide::Left, rec(1000, 1, 10)).unwrap();
        op.execute(JoinSide::Left, rec(1100, 2, 11)).unwrap();
        op.execute(JoinSide::Right, rec(1200, 1, 20)).unwrap();
        op.execute(JoinSide::Right, rec(2500, 2, 21)).unwrap(); // falls in the next window, no match here

        let ready = op.advance_watermark(JoinSide::Left, 2500);
        let ready = {
            let mut r = ready;
            r.extend(op.advance_watermark(JoinSide::Right, 2500));
            r
        };
        let window = ready
            .into_iter()
            .find(|w| w.start() == 1000)
            .expect("window [1000,2000) ready");
        assert_eq!(window.start(), 1000);
        assert_eq!(window.end(), 2000);

        let outputs = probe_window(&op, &window);
        assert_eq!(outputs.len(), 1);
        let output = &outputs[0];
        assert_eq!(output.window_start, 1000);
        assert_eq!(output.window_end, 2000);
        assert_eq!(output.join_key, Value::U64(1));
        assert_eq!(output.record.get("left_value"), Some(&Value::U64(10)));
        assert_eq!(output.record.get("right_value"), Some(&Value::U64(20)));

        op.retire_if_drained(window.start());
    }

    #[test]
    fn records_do_not_leak_across_window_boundaries() {
        let op = StreamingHashJoinOperator::new(WindowDefinition::tumbling(1000), 1, 4, "key", "key");
        op.execute(JoinSide::Left, rec(500, 7, 1)).unwrap();
        op.execute(JoinSide::Right, rec(1500, 7, 2)).unwrap();

        let w0 = op.handler.get(0).expect("window [0,1000) exists");
        let outputs = probe_window(&op, &w0);
        assert!(outputs.is_empty(), "right side record belongs to the next window, not this one");
    }

    #[test]
    fn missing_join_key_is_rejected() {
        let op = StreamingHashJoinOperator::new(WindowDefinition::tumbling(1000), 1, 4, "missing", "key");
        let err = op.execute(JoinSide::Left, rec(0, 1, 1)).unwrap_err();
        assert!(matches!(err, JoinError::MissingJoinKey { .. }));
    }

    #[test]
    fn probing_an_unclaimed_partition_twice_fails_the_second_caller() {
        let op = StreamingHashJoinOperator::new(WindowDefinition::tumbling(1000), 1, 4, "key", "key");
        op.execute(JoinSide::Left, rec(0, 1, 1)).unwrap();
        let window = op.handler.get(0).unwrap();
        assert!(op.probe_partition(&window, 0).is_ok());
        assert!(matches!(
            op.probe_partition(&window, 0).unwrap_err(),
            JoinError::PartitionNotClaimable { .. }
        ));
    }
}
