use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use tidal_types::{BufferRecycler, TupleBuffer};

use crate::error::BufferError;

struct State {
    storages: Vec<Option<Vec<u8>>>,
    free: VecDeque<usize>,
}

/// Shared bookkeeping behind both [`crate::BufferPool`] and
/// [`crate::FixedSizeBufferPool`]: a fixed table of pre-allocated byte
/// regions, a free list, and a condvar so blocking checkouts park instead of
/// spinning. A `PoolCore` implements [`BufferRecycler`] directly so checked
/// out buffers can return to it without any intermediate wrapper.
pub(crate) struct PoolCore {
    buffer_size: usize,
    state: Mutex<State>,
    not_empty: Condvar,
    destroyed: AtomicBool,
    outstanding: AtomicUsize,
}

impl PoolCore {
    pub(crate) fn new(storages: Vec<Vec<u8>>, buffer_size: usize) -> Arc<Self> {
        let free = (0..storages.len()).collect();
        let storages = storages.into_iter().map(Some).collect();
        Arc::new(Self {
            buffer_size,
            state: Mutex::new(State { storages, free }),
            not_empty: Condvar::new(),
            destroyed: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.state.lock().storages.len()
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Parks the calling thread until a buffer is free or the pool is
    /// destroyed out from under it. Cancel-safe in the sense that a thread
    /// woken spuriously simply re-checks the free list; nothing is lost.
    pub(crate) fn checkout_blocking(self: &Arc<Self>) -> Result<TupleBuffer, BufferError> {
        let mut state = self.state.lock();
        loop {
            if self.destroyed.load(Ordering::Acquire) {
                return Err(BufferError::PoolDestroyed);
            }
            if let Some(slot) = state.free.pop_front() {
                let storage = state.storages[slot]
                    .take()
                    .expect("free slot always carries its storage");
                drop(state);
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                return Ok(self.wrap(slot, storage));
            }
            self.not_empty.wait(&mut state);
        }
    }

    pub(crate) fn checkout_non_blocking(self: &Arc<Self>) -> Result<TupleBuffer, BufferError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(BufferError::PoolDestroyed);
        }
        let mut state = self.state.lock();
        match state.free.pop_front() {
            Some(slot) => {
                let storage = state.storages[slot]
                    .take()
                    .expect("free slot always carries its storage");
                drop(state);
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                Ok(self.wrap(slot, storage))
            }
            None => {
                let capacity = state.storages.len();
                Err(BufferError::PoolExhausted { capacity })
            }
        }
    }

    /// Removes `n` storages from the free list for a sub-pool reservation.
    /// Blocks until `n` are simultaneously available; never splits a
    /// reservation across multiple waits so a sub-pool always starts with
    /// its full, contiguous allotment.
    pub(crate) fn reserve_storages(self: &Arc<Self>, n: usize) -> Vec<Vec<u8>> {
        let mut state = self.state.lock();
        loop {
            if state.free.len() >= n {
                let mut taken = Vec::with_capacity(n);
                for _ in 0..n {
                    let slot = state.free.pop_front().expect("checked length above");
                    taken.push(
                        state.storages[slot]
                            .take()
                            .expect("free slot always carries its storage"),
                    );
                }
                return taken;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Returns storages reserved by a now-destroyed sub-pool, appending fresh
    /// slots rather than reusing the original indices (the sub-pool may have
    /// renumbered them locally).
    pub(crate) fn return_storages(&self, returned: Vec<Vec<u8>>) {
        let mut state = self.state.lock();
        for storage in returned {
            let slot = state.storages.len();
            state.storages.push(Some(storage));
            state.free.push_back(slot);
        }
        drop(state);
        self.not_empty.notify_all();
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.not_empty.notify_all();
    }

    fn wrap(self: &Arc<Self>, slot: usize, storage: Vec<u8>) -> TupleBuffer {
        TupleBuffer::from_pool(slot, storage, self.buffer_size, self.clone())
    }
}

impl BufferRecycler for PoolCore {
    fn recycle(&self, payload: Vec<u8>, slot: usize) {
        let mut state = self.state.lock();
        state.storages[slot] = Some(payload);
        state.free.push_back(slot);
        drop(state);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        // notify_all, not notify_one: a multi-slot reservation
        // (reserve_storages) can be waiting alongside single-slot checkouts,
        // and a single targeted wakeup can land on a waiter whose condition
        // still isn't satisfied, stranding everyone else.
        self.not_empty.notify_all();
    }
}
