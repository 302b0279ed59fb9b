// Backs the `Lambda` source type (§4.4, §6 `SourceDescriptor::Lambda`): a
// caller-supplied closure stands in for an external feed, letting embedders
// (and tests) drive a `SourceDriver` without a real file/TCP/ZMQ endpoint.

use tidal_source::{DataReceiver, ReceiveOutcome, SourceError};
use tidal_types::{OriginId, Record};

use crate::codec::encode_into;

/// A [`DataReceiver`] whose tuples come from repeatedly calling a
/// user-supplied closure rather than reading an external feed. `next_batch`
/// returns `None` once exhausted, mirroring the file source hitting EOF.
pub struct LambdaSource<F> {
    origin_id: OriginId,
    next_batch: F,
    sample_field: Option<String>,
}

impl<F> LambdaSource<F>
where
    F: FnMut() -> Option<Vec<Record>> + Send,
{
    pub fn new(origin_id: OriginId, next_batch: F) -> Self {
        Self {
            origin_id,
            next_batch,
            sample_field: None,
        }
    }

    /// Names the numeric field sampled into `ReceiveOutcome::Produced`'s
    /// `sample_values`, feeding the adaptive gathering modes' bandwidth
    /// estimate. Sources that never run under an adaptive mode can skip
    /// this.
    pub fn with_sample_field(mut self, field: impl Into<String>) -> Self {
        self.sample_field = Some(field.into());
        self
    }
}

impl<F> DataReceiver for LambdaSource<F>
where
    F: FnMut() -> Option<Vec<Record>> + Send,
{
    fn receive(&mut self, buffer: &tidal_types::TupleBuffer) -> Result<ReceiveOutcome, SourceError> {
        let Some(records) = (self.next_batch)() else {
            return Ok(ReceiveOutcome::Exhausted);
        };

        let watermark = records.iter().map(Record::event_time).max().unwrap_or(0);
        let sample_values = match &self.sample_field {
            Some(field) => records
                .iter()
                .filter_map(|r| r.get(field).and_then(tidal_types::Value::as_f64))
                .collect(),
            None => Vec::new(),
        };

        encode_into(buffer, &records).map_err(|source| SourceError::ReceiveFailed {
            origin_id: self.origin_id,
            reason: source.to_string(),
        })?;

        Ok(ReceiveOutcome::Produced {
            watermark,
            sample_values,
        })
    }
}
