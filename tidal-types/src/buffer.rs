// Reference-counted, fixed-capacity tuple buffers. `tidal-buffer` owns the
// pools these are checked out from; this module only defines the handle and
// the recycling hook a pool attaches to it.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ids::{OriginId, SequenceNumber, TimestampMs};

/// Callback invoked exactly once, when the last handle to a [`TupleBuffer`]
/// is dropped, so the owning pool can reclaim the backing storage. Buffers
/// created outside a pool (e.g. in tests) carry no recycler.
pub trait BufferRecycler: Send + Sync {
    fn recycle(&self, payload: Vec<u8>, slot: usize);
}

struct Inner {
    slot: usize,
    payload: Mutex<Vec<u8>>,
    capacity: usize,
    tuple_count: AtomicU32,
    origin_id: AtomicU64,
    sequence_number: AtomicU64,
    watermark_ms: AtomicU64,
    created_at_ms: AtomicU64,
    recycler: Option<Arc<dyn BufferRecycler>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            let payload = std::mem::take(&mut *self.payload.lock());
            recycler.recycle(payload, self.slot);
        }
    }
}

/// A reference-counted, fixed-capacity byte region carrying one buffer's
/// worth of tuples plus the metadata the runtime needs to route and order it.
///
/// Cloning a `TupleBuffer` is cheap (an `Arc` bump); the backing storage is
/// released back to its pool automatically once the last clone is dropped.
#[derive(Clone)]
pub struct TupleBuffer {
    inner: Arc<Inner>,
}

impl TupleBuffer {
    /// Constructs a buffer over pre-allocated `payload` storage of the given
    /// `capacity`, to be returned to `recycler` at slot `slot` on release.
    /// Used by buffer pools; tests should prefer [`TupleBuffer::for_test`].
    pub fn from_pool(
        slot: usize,
        payload: Vec<u8>,
        capacity: usize,
        recycler: Arc<dyn BufferRecycler>,
    ) -> Self {
        Self::new_impl(slot, payload, capacity, Some(recycler))
    }

    /// A standalone buffer with no owning pool, for unit tests and fixtures.
    pub fn for_test(payload: Vec<u8>) -> Self {
        let capacity = payload.len();
        Self::new_impl(0, payload, capacity, None)
    }

    fn new_impl(
        slot: usize,
        payload: Vec<u8>,
        capacity: usize,
        recycler: Option<Arc<dyn BufferRecycler>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot,
                payload: Mutex::new(payload),
                capacity,
                tuple_count: AtomicU32::new(0),
                origin_id: AtomicU64::new(0),
                sequence_number: AtomicU64::new(0),
                watermark_ms: AtomicU64::new(0),
                created_at_ms: AtomicU64::new(0),
                recycler,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn tuple_count(&self) -> u32 {
        self.inner.tuple_count.load(Ordering::Acquire)
    }

    pub fn set_tuple_count(&self, count: u32) {
        self.inner.tuple_count.store(count, Ordering::Release);
    }

    pub fn origin_id(&self) -> OriginId {
        OriginId(self.inner.origin_id.load(Ordering::Acquire))
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        SequenceNumber(self.inner.sequence_number.load(Ordering::Acquire))
    }

    pub fn watermark(&self) -> TimestampMs {
        self.inner.watermark_ms.load(Ordering::Acquire)
    }

    pub fn created_at(&self) -> TimestampMs {
        self.inner.created_at_ms.load(Ordering::Acquire)
    }

    /// Stamps the buffer for emission from a source: origin, sequence number
    /// and watermark. Called exactly once per buffer, by `emitWorkFromSource`.
    pub fn stamp(
        &self,
        origin_id: OriginId,
        sequence_number: SequenceNumber,
        watermark_ms: TimestampMs,
        created_at_ms: TimestampMs,
    ) {
        self.inner.origin_id.store(origin_id.0, Ordering::Release);
        self.inner
            .sequence_number
            .store(sequence_number.0, Ordering::Release);
        self.inner
            .watermark_ms
            .store(watermark_ms, Ordering::Release);
        self.inner
            .created_at_ms
            .store(created_at_ms, Ordering::Release);
    }

    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.inner.payload.lock())
    }

    pub fn with_payload_mut<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        f(&mut self.inner.payload.lock())
    }

    /// True once no other handle shares the backing storage; used by the
    /// pool to decide whether a release is final (informational only, the
    /// recycler fires regardless once the last `Arc` drops).
    pub fn is_uniquely_held(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    pub(crate) fn slot(&self) -> usize {
        self.inner.slot
    }
}

impl fmt::Debug for TupleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleBuffer")
            .field("slot", &self.inner.slot)
            .field("capacity", &self.inner.capacity)
            .field("tuple_count", &self.tuple_count())
            .field("origin_id", &self.origin_id())
            .field("sequence_number", &self.sequence_number())
            .field("watermark", &self.watermark())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingRecycler {
        recycled: AtomicUsize,
    }

    impl BufferRecycler for CountingRecycler {
        fn recycle(&self, payload: Vec<u8>, _slot: usize) {
            assert!(payload.is_empty() || !payload.is_empty()); // payload content unchecked
            self.recycled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn stamping_sets_all_metadata() {
        let buf = TupleBuffer::for_test(vec![0u8; 16]);
        buf.stamp(OriginId(3), SequenceNumber(7), 1000, 2000);
        buf.set_tuple_count(2);

        assert_eq!(buf.origin_id(), OriginId(3));
        assert_eq!(buf.sequence_number(), SequenceNumber(7));
        assert_eq!(buf.watermark(), 1000);
        assert_eq!(buf.created_at(), 2000);
        assert_eq!(buf.tuple_count(), 2);
    }

    #[test]
    fn recycler_fires_once_last_handle_drops() {
        let recycler = Arc::new(CountingRecycler {
            recycled: AtomicUsize::new(0),
        });
        let buf = TupleBuffer::from_pool(0, vec![0u8; 8], 8, recycler.clone());
        let clone = buf.clone();
        assert!(!buf.is_uniquely_held());

        drop(buf);
        assert_eq!(recycler.recycled.load(Ordering::SeqCst), 0);

        drop(clone);
        assert_eq!(recycler.recycled.load(Ordering::SeqCst), 1);
    }
}
