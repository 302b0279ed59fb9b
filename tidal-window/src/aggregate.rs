use tidal_types::{Record, Value};

use crate::Aggregator;

/// `count(*)`. The partial is the running count; `finalize` emits it as a
/// `U64`.
#[derive(Clone)]
pub struct CountAggregator;

impl Aggregator for CountAggregator {
    type Partial = u64;

    fn identity(&self) -> u64 {
        0
    }

    fn lift(&self, _record: &Record) -> u64 {
        1
    }

    fn combine(&self, a: &u64, b: &u64) -> u64 {
        a + b
    }

    fn finalize(&self, partial: &u64) -> Value {
        Value::U64(*partial)
    }
}

/// `sum(field)`, read as `f64` and re-materialized through the numeric type
/// the field lifts as.
#[derive(Clone)]
pub struct SumAggregator {
    pub field: String,
}

impl Aggregator for SumAggregator {
    type Partial = f64;

    fn identity(&self) -> f64 {
        0.0
    }

    fn lift(&self, record: &Record) -> f64 {
        record
            .get(&self.field)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    fn combine(&self, a: &f64, b: &f64) -> f64 {
        a + b
    }

    fn finalize(&self, partial: &f64) -> Value {
        Value::F64(*partial)
    }
}

#[derive(Clone)]
pub struct MinAggregator {
    pub field: String,
}

impl Aggregator for MinAggregator {
    type Partial = Option<f64>;

    fn identity(&self) -> Option<f64> {
        None
    }

    fn lift(&self, record: &Record) -> Option<f64> {
        record.get(&self.field).and_then(Value::as_f64)
    }

    fn combine(&self, a: &Option<f64>, b: &Option<f64>) -> Option<f64> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(*b)),
            (Some(a), None) => Some(*a),
            (None, Some(b)) => Some(*b),
            (None, None) => None,
        }
    }

    fn finalize(&self, partial: &Option<f64>) -> Value {
        Value::F64(partial.unwrap_or(0.0))
    }
}

#[derive(Clone)]
pub struct MaxAggregator {
    pub field: String,
}

impl Aggregator for MaxAggregator {
    type Partial = Option<f64>;

    fn identity(&self) -> Option<f64> {
        None
    }

    fn lift(&self, record: &Record) -> Option<f64> {
        record.get(&self.field).and_then(Value::as_f64)
    }

    fn combine(&self, a: &Option<f64>, b: &Option<f64>) -> Option<f64> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.max(*b)),
            (Some(a), None) => Some(*a),
            (None, Some(b)) => Some(*b),
            (None, None) => None,
        }
    }

    fn finalize(&self, partial: &Option<f64>) -> Value {
        Value::F64(partial.unwrap_or(0.0))
    }
}

/// `avg(field)`, carried as `(sum, count)` so partials combine associatively;
/// `finalize` divides only at materialization time. Median is the natural
/// next aggregator in this algebra but isn't provided (no associative
/// combine exists over fixed-size partials without an order-statistic
/// structure — see §4.5).
#[derive(Clone)]
pub struct AvgAggregator {
    pub field: String,
}

impl Aggregator for AvgAggregator {
    type Partial = (f64, u64);

    fn identity(&self) -> (f64, u64) {
        (0.0, 0)
    }

    fn lift(&self, record: &Record) -> (f64, u64) {
        let value = record.get(&self.field).and_then(Value::as_f64).unwrap_or(0.0);
        (value, 1)
    }

    fn combine(&self, a: &(f64, u64), b: &(f64, u64)) -> (f64, u64) {
        (a.0 + b.0, a.1 + b.1)
    }

    fn finalize(&self, partial: &(f64, u64)) -> Value {
        let (sum, count) = *partial;
        if count == 0 {
            Value::F64(0.0)
        } else {
            Value::F64(sum / count as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: u64) -> Record {
        Record::new("ts").with_field("value", Value::U64(value)).with_field("ts", Value::U64(0))
    }

    #[test]
    fn count_combines_across_slices() {
        let agg = CountAggregator;
        let mut partial = agg.identity();
        for _ in 0..4 {
            partial = agg.combine(&partial, &agg.lift(&record(1)));
        }
        assert_eq!(agg.finalize(&partial), Value::U64(4));
    }

    #[test]
    fn avg_divides_only_at_finalize() {
        let agg = AvgAggregator {
            field: "value".into(),
        };
        let mut partial = agg.identity();
        for v in [1, 2, 3, 4] {
            partial = agg.combine(&partial, &agg.lift(&record(v)));
        }
        assert_eq!(agg.finalize(&partial), Value::F64(2.5));
    }
}
