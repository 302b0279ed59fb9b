use tidal_types::{TimestampMs, TupleBuffer};

use crate::error::SourceError;

/// What a [`DataReceiver`] produced for one iteration of the gathering loop.
pub enum ReceiveOutcome {
    /// The buffer was filled with tuples; `watermark` is the greatest event
    /// timestamp among them, used to advance this source's watermark.
    /// `sample_values` carries a representative numeric value per tuple, fed
    /// to the adaptive gathering modes' bandwidth estimate; sources that
    /// never run under an adaptive mode may leave it empty.
    Produced {
        watermark: TimestampMs,
        sample_values: Vec<f64>,
    },
    /// No more data; the driver stops gracefully without emitting `buffer`.
    Exhausted,
}

/// Source-type specific tuple production (`receiveData`, §4.4). Implementors
/// write tuples into `buffer` (already checked out of the source's local
/// pool, capacity already known) and report the outcome. `Err` stops the
/// driver with `TerminationKind::Failure`.
pub trait DataReceiver: Send {
    fn receive(&mut self, buffer: &TupleBuffer) -> Result<ReceiveOutcome, SourceError>;
}
