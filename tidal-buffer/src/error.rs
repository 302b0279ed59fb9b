use thiserror::Error;

use tidal_types::ErrorSeverity;

/// Errors raised by buffer acquisition and pool lifecycle management.
#[derive(Debug, Error)]
pub enum BufferError {
    /// `getBufferNonBlocking` found no free buffer and no in-flight release.
    #[error("buffer pool exhausted: all {capacity} buffers are checked out")]
    PoolExhausted { capacity: usize },

    /// A buffer was requested from, or returned to, a pool that already had
    /// `destroy()` called on it.
    #[error("buffer pool already destroyed")]
    PoolDestroyed,
}

impl ErrorSeverity for BufferError {
    fn is_fatal(&self) -> bool {
        // Exhaustion is an expected, recoverable backpressure signal; callers
        // fall back to the blocking variant or retry later. A destroyed pool
        // being touched again indicates a lifecycle bug in the caller.
        matches!(self, BufferError::PoolDestroyed)
    }
}
