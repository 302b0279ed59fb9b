use crate::page::{page_capacity, Entry, Page};

/// A chained hash table of fixed-size pages for one partition of one build
/// side (§4.6): `num_buckets` independent chains, each a `Vec<Page>` that
/// grows by appending a fresh page when the tail is full.
pub struct BuildTable {
    buckets: Vec<Vec<Page>>,
    num_buckets: usize,
}

impl BuildTable {
    pub fn new(num_buckets: usize) -> Self {
        assert!(num_buckets > 0, "num_buckets must be positive");
        Self {
            buckets: (0..num_buckets).map(|_| Vec::new()).collect(),
            num_buckets,
        }
    }

    pub fn bucket_of(&self, key_hash: u64) -> usize {
        (key_hash % self.num_buckets as u64) as usize
    }

    /// Copies `entry` into the tail page of its bucket's chain, allocating a
    /// new page if the tail is full or the chain is empty.
    pub fn insert(&mut self, entry: Entry) {
        let bucket = self.bucket_of(entry.key_hash);
        let chain = &mut self.buckets[bucket];
        match chain.last_mut() {
            Some(page) if page.push(entry.clone()) => {}
            _ => {
                let mut page = Page::new(page_capacity());
                page.push(entry);
                chain.push(page);
            }
        }
    }

    pub fn chain(&self, bucket: usize) -> &[Page] {
        &self.buckets[bucket]
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn tuple_count(&self) -> usize {
        self.buckets
            .iter()
            .flat_map(|chain| chain.iter())
            .map(Page::len)
            .sum()
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
    fn same_hash_lands_in_same_bucket_across_inserts() {
        let mut table = BuildTable::new(4);
        table.insert(entry(5));
        table.insert(entry(5));
        table.insert(entry(9)); // 9 % 4 == 1 == 5 % 4
        assert_eq!(table.chain(1).iter().map(Page::len).sum::<usize>(), 3);
        assert_eq!(table.tuple_count(), 3);
    }
}
