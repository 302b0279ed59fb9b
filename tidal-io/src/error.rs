use std::path::PathBuf;

use thiserror::Error;

use tidal_types::ErrorSeverity;

/// Errors raised by the codec and sink/source adapters that bridge
/// byte-oriented [`TupleBuffer`](tidal_types::TupleBuffer)s to the
/// [`Record`](tidal_types::Record)-oriented window and join operators
/// (§4.9, this crate's "glue layer").
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to encode {count} record(s) into a buffer payload: {source}")]
    Encode {
        count: usize,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to decode a buffer payload into records: {source}")]
    Decode {
        #[source]
        source: bincode::Error,
    },

    #[error("failed to open sink file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write sink file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ErrorSeverity for IoError {
    fn is_fatal(&self) -> bool {
        true
    }
}
