use thiserror::Error;

use tidal_types::{ErrorSeverity, PartitionId};

/// Errors raised by partition (de)registration and channel I/O.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("consumer already registered for partition {0}")]
    AlreadyRegistered(PartitionId),

    /// Mirrors `WireErrorKind::PartitionNotRegistered`: the receiver has no
    /// consumer for this partition. Recoverable; the caller retries.
    #[error("partition {0} is not registered on the remote side")]
    PartitionNotRegistered(PartitionId),

    /// Mirrors `WireErrorKind::DeletedPartitionError`: the receiver's
    /// consumer was unregistered. Not recoverable, the channel is abandoned.
    #[error("partition {0} was deleted on the remote side")]
    DeletedPartitionError(PartitionId),

    #[error("producer for partition {0} exhausted {retries} retries connecting to {peer}")]
    RetriesExhausted {
        partition: PartitionId,
        peer: String,
        retries: u32,
    },

    #[error("transport error on partition {partition}: {source}")]
    Transport {
        partition: PartitionId,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed wire message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("oversized frame: {0} bytes")]
    FrameTooLarge(u32),

    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorSeverity for NetworkError {
    fn is_fatal(&self) -> bool {
        // AlreadyRegistered and PartitionNotRegistered are retried by callers
        // without tearing down the sub-plan; everything else ends the
        // channel and, per §7, promotes the owning sub-plan to ErrorState.
        !matches!(
            self,
            NetworkError::AlreadyRegistered(_) | NetworkError::PartitionNotRegistered(_)
        )
    }
}
