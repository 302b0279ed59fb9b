use thiserror::Error;

use tidal_types::ErrorSeverity;

/// Errors raised by the windowed aggregation path.
#[derive(Debug, Error)]
pub enum WindowError {
    /// No slice covers the looked-up timestamp: a fatal precondition
    /// violation, since it means the caller failed to append slices up to
    /// `ts` before looking one up (§9).
    #[error("no slice covers timestamp {ts} (store has {slice_count} slices)")]
    SliceIndexMiss { ts: u64, slice_count: usize },
}

impl ErrorSeverity for WindowError {
    fn is_fatal(&self) -> bool {
        true
    }
}
