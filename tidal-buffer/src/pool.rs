use std::sync::Arc;

use tidal_types::TupleBuffer;

use crate::core::PoolCore;
use crate::error::BufferError;

/// The process-wide pool of fixed-size tuple buffers backing
/// `NodeEngine::start()` (§4.1). All buffers are allocated up front at
/// construction; none are ever grown, shrunk, or reallocated for the life of
/// the pool.
///
/// Mirrors the per-source/per-worker sub-pools obtained through
/// [`BufferPool::create_fixed_size_buffer_pool`]: callers that need a private,
/// exhaustion-isolated slice of the global budget (a source thread, a worker)
/// reserve one instead of sharing the global free list directly.
pub struct BufferPool {
    core: Arc<PoolCore>,
    buffer_size: usize,
}

impl BufferPool {
    /// Allocates `capacity` buffers of `buffer_size_in_bytes` each, eagerly.
    pub fn new(capacity: usize, buffer_size_in_bytes: usize) -> Self {
        let storages = (0..capacity)
            .map(|_| vec![0u8; buffer_size_in_bytes])
            .collect();
        Self {
            core: PoolCore::new(storages, buffer_size_in_bytes),
            buffer_size: buffer_size_in_bytes,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    pub fn outstanding(&self) -> usize {
        self.core.outstanding()
    }

    /// Blocks the calling thread until a buffer is available. Intended for
    /// use from a dedicated source/worker OS thread, not from within an
    /// async task (it parks the thread, not the task).
    pub fn get_buffer_blocking(&self) -> Result<TupleBuffer, BufferError> {
        self.core.checkout_blocking()
    }

    /// Returns immediately with [`BufferError::PoolExhausted`] rather than
    /// waiting. Used by the adaptive gathering modes (§4.4), which treat
    /// exhaustion as a signal to skip this tick rather than stall.
    pub fn get_buffer_non_blocking(&self) -> Result<TupleBuffer, BufferError> {
        self.core.checkout_non_blocking()
    }

    /// Reserves `n` buffers out of the global pool as an independent
    /// sub-pool, released back to the global free list together when the
    /// sub-pool is destroyed. Blocks until `n` buffers are simultaneously
    /// free.
    pub fn create_fixed_size_buffer_pool(&self, n: usize) -> FixedSizeBufferPool {
        let storages = self.core.reserve_storages(n);
        FixedSizeBufferPool {
            core: PoolCore::new(storages, self.buffer_size),
            parent: self.core.clone(),
        }
    }

    /// Tears the pool down. Idempotent: calling it again after a first,
    /// successful call is a no-op. Calling it while any buffer checked out of
    /// this pool is still outstanding is a caller bug and panics, matching
    /// the fatal-precondition style of `WindowSliceStore::getSliceIndexByTs`.
    pub fn destroy(&self) {
        if self.core.is_destroyed() {
            return;
        }
        assert_eq!(
            self.core.outstanding(),
            0,
            "BufferPool::destroy called with {} buffers still checked out",
            self.core.outstanding()
        );
        self.core.mark_destroyed();
    }
}

/// A reserved, independently-exhaustible slice of a [`BufferPool`]'s
/// capacity, returned by [`BufferPool::create_fixed_size_buffer_pool`].
pub struct FixedSizeBufferPool {
    core: Arc<PoolCore>,
    parent: Arc<PoolCore>,
}

impl FixedSizeBufferPool {
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    pub fn outstanding(&self) -> usize {
        self.core.outstanding()
    }

    pub fn get_buffer_blocking(&self) -> Result<TupleBuffer, BufferError> {
        self.core.checkout_blocking()
    }

    pub fn get_buffer_non_blocking(&self) -> Result<TupleBuffer, BufferError> {
        self.core.checkout_non_blocking()
    }

    /// Idempotent; fatal (panics) if any buffer drawn from this sub-pool is
    /// still outstanding. On success, every storage this sub-pool reserved is
    /// handed back to the parent pool's free list.
    pub fn destroy(&self) {
        if self.core.is_destroyed() {
            return;
        }
        let outstanding = self.core.outstanding();
        assert_eq!(
            outstanding, 0,
            "FixedSizeBufferPool::destroy called with {outstanding} buffers still checked out"
        );
        let capacity = self.core.capacity();
        let reclaimed = self.core.reserve_storages(capacity);
        self.core.mark_destroyed();
        self.parent.return_storages(reclaimed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_checkout_hands_out_zeroed_length_buffers() {
        let pool = BufferPool::new(2, 64);
        let buf = pool.get_buffer_blocking().expect("buffer available");
        assert_eq!(buf.tuple_count(), 0);
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn non_blocking_checkout_exhausts_then_recovers_on_release() {
        let pool = BufferPool::new(1, 16);
        let buf = pool.get_buffer_blocking().expect("first checkout succeeds");
        assert!(matches!(
            pool.get_buffer_non_blocking(),
            Err(BufferError::PoolExhausted { capacity: 1 })
        ));

        drop(buf);
        assert!(pool.get_buffer_non_blocking().is_ok());
    }

    #[test]
    fn released_buffer_is_reissued_with_tuple_count_reset() {
        let pool = BufferPool::new(1, 16);
        let buf = pool.get_buffer_blocking().unwrap();
        buf.set_tuple_count(7);
        drop(buf);

        let reissued = pool.get_buffer_blocking().unwrap();
        assert_eq!(reissued.tuple_count(), 0);
    }

    #[test]
    fn destroy_is_idempotent_once_nothing_outstanding() {
        let pool = BufferPool::new(1, 16);
        pool.destroy();
        pool.destroy();
    }

    #[test]
    #[should_panic(expected = "still checked out")]
    fn destroy_panics_with_outstanding_buffers() {
        let pool = BufferPool::new(1, 16);
        let _buf = pool.get_buffer_blocking().unwrap();
        pool.destroy();
    }

    #[test]
    fn fixed_size_sub_pool_reserves_capacity_from_parent() {
        let pool = BufferPool::new(4, 16);
        let sub = pool.create_fixed_size_buffer_pool(3);
        assert_eq!(sub.capacity(), 3);
        assert!(pool.get_buffer_non_blocking().is_ok());
        assert!(matches!(
            pool.get_buffer_non_blocking(),
            Err(BufferError::PoolExhausted { capacity: 4 })
        ));
    }

    #[test]
    fn destroying_sub_pool_returns_buffers_to_parent() {
        let pool = BufferPool::new(2, 16);
        let sub = pool.create_fixed_size_buffer_pool(2);
        assert!(matches!(
            pool.get_buffer_non_blocking(),
            Err(BufferError::PoolExhausted { capacity: 2 })
        ));

        sub.destroy();
        assert!(pool.get_buffer_non_blocking().is_ok());
    }

    #[test]
    fn checkout_after_destroy_is_an_error() {
        let pool = BufferPool::new(1, 16);
        pool.destroy();
        assert!(matches!(
            pool.get_buffer_non_blocking(),
            Err(BufferError::PoolDestroyed)
        ));
        assert!(matches!(
            pool.get_buffer_blocking(),
            Err(BufferError::PoolDestroyed)
        ));
    }
}
