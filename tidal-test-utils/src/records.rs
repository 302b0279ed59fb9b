use tidal_types::{Record, TimestampMs, Value};

/// A deterministic `{value, id, ts}` tuple, the schema used by scenarios 1-3
/// of the windowing property tests.
pub fn keyed_tuple(value: u64, id: u64, ts: TimestampMs) -> Record {
    Record::new("ts")
        .with_field("value", Value::U64(value))
        .with_field("id", Value::U64(id))
        .with_field("ts", Value::U64(ts))
}

/// A deterministic join-side tuple `{f1, f2(key), ts}`, the schema used by
/// scenario 4.
pub fn join_tuple(f1: u64, f2_key: u64, ts: TimestampMs) -> Record {
    Record::new("ts")
        .with_field("f1", Value::U64(f1))
        .with_field("f2", Value::U64(f2_key))
        .with_field("ts", Value::U64(ts))
}

/// `count` single-field `{id, ts}` tuples spaced `interval_ms` apart
/// starting at `start_ts`, all sharing `id` — a deterministic generator for
/// union-of-sources style fixtures (scenario 5) where only volume and
/// identity matter, not content.
pub fn tuple_sequence(id: u64, count: u64, start_ts: TimestampMs, interval_ms: u64) -> Vec<Record> {
    (0..count)
        .map(|i| keyed_tuple(1, id, start_ts + i * interval_ms))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_sequence_is_deterministic_and_monotonic_in_ts() {
        let seq = tuple_sequence(7, 5, 1000, 100);
        assert_eq!(seq.len(), 5);
        let timestamps: Vec<u64> = seq.iter().map(|r| r.event_time()).collect();
        assert_eq!(timestamps, vec![1000, 1100, 1200, 1300, 1400]);
        assert!(seq.iter().all(|r| r.get("id") == Some(&Value::U64(7))));
    }
}
