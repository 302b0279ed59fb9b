//! Thread-per-source data production (§4.4): [`SourceDriver`] runs one of
//! three pacing regimes (fixed interval, ingestion-rate, adaptive) over a
//! caller-supplied [`DataReceiver`], stamping and forwarding every buffer it
//! produces to the source's [`DataEmitter`] successors.

mod driver;
mod emitter;
mod error;
mod history;
mod kalman;
mod nyquist;
mod receiver;

pub use driver::{SourceDriver, SourceStatus};
pub use emitter::DataEmitter;
pub use error::SourceError;
pub use receiver::{DataReceiver, ReceiveOutcome};
