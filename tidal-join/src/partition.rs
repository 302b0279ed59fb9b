use parking_lot::Mutex;

use crate::page::Entry;
use crate::table::BuildTable;

/// `numPartitions` independent [`BuildTable`]s for one build side of one
/// window (§4.6). Each partition is individually locked so concurrent
/// builders touching different partitions never contend; the lock is only
/// ever held for the duration of one insert or one probe pass.
pub struct PartitionedTable {
    partitions: Vec<Mutex<BuildTable>>,
    num_partitions: usize,
    num_buckets: usize,
}

impl PartitionedTable {
    pub fn new(num_partitions: usize, num_buckets: usize) -> Self {
        assert!(num_partitions > 0, "num_partitions must be positive");
        Self {
            partitions: (0..num_partitions)
                .map(|_| Mutex::new(BuildTable::new(num_buckets)))
                .collect(),
            num_partitions,
            num_buckets,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn partition_of(&self, key_hash: u64) -> usize {
        (key_hash % self.num_partitions as u64) as usize
    }

    pub fn insert(&self, key_hash: u64, entry: Entry) {
        let partition = self.partition_of(key_hash);
        self.partitions[partition].lock().insert(entry);
    }

    /// Locks partition `p` for the duration of `f`. During Probe this is
    /// effectively uncontended (pages are immutable and no further inserts
    /// happen), but the lock is kept for a uniform access path.
    pub fn with_partition<R>(&self, p: usize, f: impl FnOnce(&BuildTable) -> R) -> R {
        f(&self.partitions[p].lock())
    }

    pub fn tuple_count(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().tuple_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidal_types::{Record, Value};

    fn entry(hash: u64) -> Entry {
        Entry {
            key_hash: hash,
            record: Arc::new(Record::new("ts").with_field("ts", Value::U64(0))),
        }
    }

    #[test]
    fn insert_routes_to_partition_by_hash_modulo() {
        let table = PartitionedTable::new(4, 8);
        table.insert(5, entry(5)); // partition 1
        table.insert(9, entry(9)); // partition 1
        table.insert(2, entry(2)); // partition 2
        assert_eq!(table.partition_of(5), 1);
        assert_eq!(table.with_partition(1, |t| t.tuple_count()), 2);
        assert_eq!(table.with_partition(2, |t| t.tuple_count()), 1);
        assert_eq!(table.tuple_count(), 3);
    }
}
