use std::sync::Arc;

use dashmap::DashMap;

use tidal_types::GroupKey;

use crate::Aggregator;
use crate::SliceStore;

/// The keyed variant of §4.5: a mapping from group key to slice store,
/// created lazily on first record per key. `A` must itself be cheap to
/// construct per key (aggregators here carry at most a field name).
pub struct KeyedSliceStore<A: Aggregator + Clone> {
    aggregator: A,
    stores: DashMap<GroupKey, Arc<SliceStore<A>>>,
}

impl<A: Aggregator + Clone> KeyedSliceStore<A> {
    pub fn new(aggregator: A) -> Self {
        Self {
            aggregator,
            stores: DashMap::new(),
        }
    }

    /// Returns the slice store for `key`, creating one on first access.
    pub fn store_for(&self, key: &GroupKey) -> Arc<SliceStore<A>> {
        if let Some(existing) = self.stores.get(key) {
            return existing.clone();
        }
        self.stores
            .entry(key.clone())
            .or_insert_with(|| Arc::new(SliceStore::new(self.aggregator.clone())))
            .clone()
    }

    pub fn keys(&self) -> Vec<GroupKey> {
        self.stores.iter().map(|e| e.key().clone()).collect()
    }

    /// Drops the store for `key` once its owning operator has finished
    /// emitting every window that touches it.
    pub fn remove(&self, key: &GroupKey) {
        self.stores.remove(key);
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CountAggregator;

    #[test]
    fn lazily_creates_one_store_per_distinct_key() {
        let keyed = KeyedSliceStore::new(CountAggregator);
        let k1 = GroupKey::single(tidal_types::Value::U64(1));
        let k2 = GroupKey::single(tidal_types::Value::U64(2));

        let s1a = keyed.store_for(&k1);
        let s1b = keyed.store_for(&k1);
        let s2 = keyed.store_for(&k2);

        assert!(Arc::ptr_eq(&s1a, &s1b));
        assert!(!Arc::ptr_eq(&s1a, &s2));
        assert_eq!(keyed.len(), 2);
    }
}
