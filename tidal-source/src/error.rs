use thiserror::Error;

use tidal_types::{ErrorSeverity, OriginId};

/// Errors a source can raise while running (§4.4). Both variants are fatal to
/// the source task: the driver reacts by setting status to Failure and
/// propagating an EoS tagged `Failure` so downstream can release (§7
/// `OperatorError`).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {origin_id} failed to receive data: {reason}")]
    ReceiveFailed { origin_id: OriginId, reason: String },

    #[error("source {origin_id} buffer pool error: {source}")]
    BufferPool {
        origin_id: OriginId,
        #[source]
        source: tidal_buffer::BufferError,
    },
}

impl ErrorSeverity for SourceError {
    fn is_fatal(&self) -> bool {
        true
    }
}
