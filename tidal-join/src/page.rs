use std::sync::Arc;

use tidal_types::Record;

/// Default page size (§4.6) expressed in bytes, and the tuple-count
/// capacity it's translated into for a page of this table's rows. Per §3,
/// `Record` is the fixed-schema row abstraction operators work with here —
/// pages hold `Arc<Record>` rather than a hand-rolled byte layout, since
/// reconstructing the byte layout the optimizer would have chosen is out of
/// scope for the core (§1).
pub const PAGE_SIZE_BYTES: usize = 128 * 1024;

/// Crude per-row size estimate used only to size a page's tuple-count
/// capacity from [`PAGE_SIZE_BYTES`]; doesn't need to be exact.
const ESTIMATED_ROW_BYTES: usize = 64;

pub fn page_capacity() -> usize {
    (PAGE_SIZE_BYTES / ESTIMATED_ROW_BYTES).max(1)
}

/// One entry in a build-side page: the tuple's pre-hashed join key (so a
/// probe can reject non-matches without re-hashing) alongside the tuple
/// itself.
#[derive(Clone)]
pub struct Entry {
    pub key_hash: u64,
    pub record: Arc<Record>,
}

/// A fixed-capacity run of entries. A bucket chain is a `Vec<Page>`; a new
/// page is allocated only when the current tail is full.
pub struct Page {
    entries: Vec<Entry>,
    capacity: usize,
}

impl Page {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Returns `false` without mutating the page if it's already full; the
    /// caller allocates a fresh page and retries there.
    pub fn push(&mut self, entry: Entry) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_types::Value;

    fn entry(hash: u64) -> Entry {
        Entry {
            key_hash: hash,
            record: Arc::new(Record::new("ts").with_field("ts", Value::U64(0))),
        }
    }

    #[test]
    fn page_rejects_push_past_capacity() {
        let mut page = Page::new(2);
        assert!(page.push(entry(1)));
        assert!(page.push(entry(2)));
        assert!(!page.push(entry(3)));
        assert_eq!(page.len(), 2);
    }
}
