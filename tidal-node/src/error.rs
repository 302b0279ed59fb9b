use thiserror::Error;

use tidal_types::ErrorSeverity;

/// Errors raised while composing or operating one process's `NodeEngine`
/// (§4.1, §4.8). Wraps every lower-layer error type this crate wires
/// together rather than flattening them, so a caller can still match on the
/// originating layer.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("engine error: {0}")]
    Engine(#[from] tidal_engine::EngineError),

    #[error("network error: {0}")]
    Network(#[from] tidal_network::NetworkError),

    #[error("source error: {0}")]
    Source(#[from] tidal_source::SourceError),

    #[error("buffer pool error: {0}")]
    Buffer(#[from] tidal_buffer::BufferError),

    #[error("io codec error: {0}")]
    Io(#[from] tidal_io::IoError),

    /// A `SourceDescriptor`/`SinkDescriptor` variant whose format parsing is
    /// an explicit non-goal of this engine (file/CSV/TCP/ZeroMQ framing).
    #[error("{descriptor} is out of scope for this engine: source/sink format parsing is a non-goal")]
    UnsupportedDescriptor { descriptor: &'static str },
}

impl ErrorSeverity for NodeError {
    fn is_fatal(&self) -> bool {
        match self {
            NodeError::Engine(err) => err.is_fatal(),
            NodeError::Network(_) => true,
            NodeError::Source(err) => err.is_fatal(),
            NodeError::Buffer(_) => true,
            NodeError::Io(err) => err.is_fatal(),
            NodeError::UnsupportedDescriptor { .. } => true,
        }
    }
}
