use parking_lot::Mutex;

use tidal_types::{SequenceNumber, TerminationKind, TupleBuffer};

/// An in-memory sink that records everything it receives, for assertions in
/// unit and end-to-end tests. Implements both the network-facing and
/// source-facing `DataEmitter` traits (§4.2, §4.4) so the same fixture wires
/// into either layer.
#[derive(Default)]
pub struct RecordingEmitter {
    buffers: Mutex<Vec<TupleBuffer>>,
    end_of_stream: Mutex<Option<TerminationKind>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<TupleBuffer> {
        self.buffers.lock().clone()
    }

    pub fn received_count(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn total_tuples(&self) -> u64 {
        self.buffers.lock().iter().map(|b| u64::from(b.tuple_count())).sum()
    }

    pub fn end_of_stream(&self) -> Option<TerminationKind> {
        *self.end_of_stream.lock()
    }

    fn record(&self, buffer: TupleBuffer) {
        self.buffers.lock().push(buffer);
    }

    fn record_eos(&self, kind: TerminationKind) {
        *self.end_of_stream.lock() = Some(kind);
    }
}

impl tidal_source::DataEmitter for RecordingEmitter {
    fn emit(&self, buffer: TupleBuffer) {
        self.record(buffer);
    }

    fn emit_end_of_stream(&self, termination_kind: TerminationKind) {
        self.record_eos(termination_kind);
    }
}

impl tidal_network::DataEmitter for RecordingEmitter {
    fn emit(&self, _seq: SequenceNumber, buffer: TupleBuffer) {
        self.record(buffer);
    }

    fn end_of_stream(&self, termination_kind: TerminationKind) {
        self.record_eos(termination_kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_buffers_and_eos_independently_of_which_trait_is_used() {
        use tidal_source::DataEmitter as SourceEmitter;

        let emitter = RecordingEmitter::new();
        let buffer = TupleBuffer::for_test(vec![0u8; 4]);
        buffer.set_tuple_count(1);
        SourceEmitter::emit(&emitter, buffer);
        SourceEmitter::emit_end_of_stream(&emitter, TerminationKind::Graceful);

        assert_eq!(emitter.received_count(), 1);
        assert_eq!(emitter.total_tuples(), 1);
        assert_eq!(emitter.end_of_stream(), Some(TerminationKind::Graceful));
    }
}
