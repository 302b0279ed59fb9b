// A layout-agnostic logical tuple used by operator code (window aggregates,
// hash join). The optimizer's physical row/columnar layout is out of scope;
// operators only ever see this materialized form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::TimestampMs;

/// A field value. Kept intentionally small: the core only needs enough
/// variants to express the schemas exercised by the windowed operators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            Value::I64(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::U64(v) => Some(*v as f64),
            Value::I64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// A discriminant-tagged, bit-exact representation of this value usable
    /// as a `HashMap`/`HashSet` key component. `F64` is compared/hashed by
    /// its bit pattern rather than IEEE equality, so `GroupKey`s built from
    /// it form a total, reflexive equivalence (at the cost of `-0.0 != 0.0`
    /// and `NaN == NaN`, neither of which arises from sensor payloads).
    pub fn group_key_bits(&self) -> (u8, u64) {
        match self {
            Value::U64(v) => (0, *v),
            Value::I64(v) => (1, *v as u64),
            Value::F64(v) => (2, v.to_bits()),
            Value::Bool(v) => (3, *v as u64),
            Value::Text(v) => (4, {
                const OFFSET: u64 = 0xcbf29ce484222325;
                const PRIME: u64 = 0x100000001b3;
                let mut hash = OFFSET;
                for b in v.as_bytes() {
                    hash ^= *b as u64;
                    hash = hash.wrapping_mul(PRIME);
                }
                hash
            }),
        }
    }

    /// A 64-bit hash of the raw value, used as the join/group key hash.
    /// Stable across process runs (no randomized seed) so that tests and
    /// partitioning agree deterministically.
    pub fn stable_hash(&self) -> u64 {
        // FNV-1a: simple, dependency-free, deterministic across runs.
        const OFFSET: u64 = 0xcbf29ce484222325;
        const PRIME: u64 = 0x100000001b3;
        let mut bytes: Vec<u8> = Vec::new();
        match self {
            Value::U64(v) => bytes.extend_from_slice(&v.to_le_bytes()),
            Value::I64(v) => bytes.extend_from_slice(&v.to_le_bytes()),
            Value::F64(v) => bytes.extend_from_slice(&v.to_bits().to_le_bytes()),
            Value::Bool(v) => bytes.push(*v as u8),
            Value::Text(v) => bytes.extend_from_slice(v.as_bytes()),
        }
        let mut hash = OFFSET;
        for b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(PRIME);
        }
        hash
    }
}

/// A grouping key built from one or more field values, usable directly as a
/// `HashMap` key by keyed window stores and the hash join's partition/bucket
/// routing. See [`Value::group_key_bits`] for the equality caveat.
#[derive(Clone, Debug)]
pub struct GroupKey(Vec<Value>);

impl GroupKey {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn single(value: Value) -> Self {
        Self(vec![value])
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.group_key_bits() == b.group_key_bits())
    }
}

impl Eq for GroupKey {}

impl std::hash::Hash for GroupKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            value.group_key_bits().hash(state);
        }
    }
}

/// A logical tuple: an ordered mapping from field name to value, plus the
/// event-time timestamp field used by windowed operators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    event_time_field: String,
}

impl Record {
    pub fn new(event_time_field: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::new(),
            event_time_field: event_time_field.into(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn event_time(&self) -> TimestampMs {
        self.fields
            .get(&self.event_time_field)
            .and_then(Value::as_u64)
            .expect("record missing its declared event-time field")
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Concatenates `self`'s fields with `other`'s under the given prefixes,
    /// used to materialize hash-join output records.
    pub fn concat(&self, self_prefix: &str, other: &Record, other_prefix: &str) -> Record {
        let mut out = Record::new(self.event_time_field.clone());
        for (name, value) in self.fields() {
            out.fields.insert(format!("{self_prefix}{name}"), value.clone());
        }
        for (name, value) in other.fields() {
            out.fields.insert(format!("{other_prefix}{name}"), value.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_key_equality_is_structural_not_positional_identity() {
        let a = GroupKey::from_values(vec![Value::U64(1), Value::Text("x".into())]);
        let b = GroupKey::from_values(vec![Value::U64(1), Value::Text("x".into())]);
        let c = GroupKey::from_values(vec![Value::U64(2), Value::Text("x".into())]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn concat_prefixes_both_sides_fields() {
        let left = Record::new("ts").with_field("ts", Value::U64(1)).with_field("k", Value::U64(1));
        let right = Record::new("ts").with_field("ts", Value::U64(1)).with_field("k", Value::U64(2));
        let joined = left.concat("left_", &right, "right_");
        assert_eq!(joined.get("left_k"), Some(&Value::U64(1)));
        assert_eq!(joined.get("right_k"), Some(&Value::U64(2)));
    }
}
