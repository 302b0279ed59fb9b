//! The glue layer between byte-oriented transport (`tidal-buffer`,
//! `tidal-network`, `tidal-source`) and the `Record`-oriented operators
//! (`tidal-window`, `tidal-join`): a bincode codec for buffer payloads, the
//! `DataEmitter` adapters that wire a sub-plan's network edges, the `Lambda`
//! source type, and the non-network `SinkDescriptor` writers (§4.9).

mod codec;
mod error;
mod lambda_source;
mod network_sink;
mod network_source;
mod record_sink;

pub use codec::{decode_from, encode_into};
pub use error::IoError;
pub use lambda_source::LambdaSource;
pub use network_sink::NetworkSink;
pub use network_source::NetworkSource;
pub use record_sink::{FileSink, NullOutputSink, PrintSink, RecordSink};
