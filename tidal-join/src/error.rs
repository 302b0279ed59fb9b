use thiserror::Error;

use tidal_types::ErrorSeverity;

#[derive(Debug, Error)]
pub enum JoinError {
    /// A worker tried to claim a partition that was already claimed or
    /// whose window isn't closed yet; see §4.6's "at most one worker"
    /// invariant.
    #[error("partition {partition} of window [{window_start},{window_end}) is not claimable")]
    PartitionNotClaimable {
        window_start: u64,
        window_end: u64,
        partition: usize,
    },

    /// A record's join key field was missing or of an incomparable type.
    #[error("join key field {field:?} missing or not comparable on a {side} record")]
    MissingJoinKey { side: &'static str, field: String },
}

impl ErrorSeverity for JoinError {
    fn is_fatal(&self) -> bool {
        true
    }
}
