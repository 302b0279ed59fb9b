// Adapts the network layer's `DataEmitter` (buffers arriving off the wire,
// addressed by sequence number) to the source layer's `DataEmitter` (buffers
// pushed downstream to successor operators). A sub-plan's network-fed input
// operator registers one `NetworkSource` as the consumer callback for its
// inbound partition; it simply forwards what arrives, in order, since
// `PartitionManager::dispatch_buffer` already delivers buffers sequentially
// per partition.

use std::sync::Arc;

use tidal_types::{SequenceNumber, TerminationKind, TupleBuffer};

/// Forwards buffers received over the network shuffle to one or more
/// downstream successors, translating between the two `DataEmitter` traits
/// (network-facing and source-facing) at the boundary.
pub struct NetworkSource {
    successors: Vec<Arc<dyn tidal_source::DataEmitter>>,
}

impl NetworkSource {
    pub fn new(successors: Vec<Arc<dyn tidal_source::DataEmitter>>) -> Arc<Self> {
        Arc::new(Self { successors })
    }
}

impl tidal_network::DataEmitter for NetworkSource {
    fn emit(&self, _seq: SequenceNumber, buffer: TupleBuffer) {
        for successor in &self.successors {
            successor.emit(buffer.clone());
        }
    }

    fn end_of_stream(&self, termination_kind: TerminationKind) {
        for successor in &self.successors {
            successor.emit_end_of_stream(termination_kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_network::DataEmitter as NetworkDataEmitter;
    use tidal_test_utils::RecordingEmitter;

    #[test]
    fn forwards_buffers_and_eos_to_every_successor() {
        let a = Arc::new(RecordingEmitter::new());
        let b = Arc::new(RecordingEmitter::new());
        let source = NetworkSource::new(vec![a.clone(), b.clone()]);

        let buffer = TupleBuffer::for_test(vec![1, 2, 3]);
        buffer.set_tuple_count(1);
        source.emit(SequenceNumber(0), buffer);
        source.end_of_stream(TerminationKind::Graceful);

        assert_eq!(a.received_count(), 1);
        assert_eq!(b.received_count(), 1);
        assert_eq!(a.end_of_stream(), Some(TerminationKind::Graceful));
        assert_eq!(b.end_of_stream(), Some(TerminationKind::Graceful));
    }
}
