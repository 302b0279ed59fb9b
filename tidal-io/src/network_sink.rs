// The reverse direction of `network_source`: adapts a `ProducerHandle` (the
// network layer's outbound channel, addressed by partition) to the source
// layer's `DataEmitter`, so an operator's output can be wired straight onto
// the shuffle fabric without knowing about partitions or sequence numbers.
// The sink owns sequencing: each buffer it forwards gets the next sequence
// number in producer order, since `ProducerHandle::write_data` expects the
// caller to supply one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use tidal_network::ProducerHandle;
use tidal_types::{NodeLocation, SequenceNumber, TerminationKind, TupleBuffer};

/// Forwards buffers emitted by an operator onto one network partition.
/// Failures are logged, not propagated: a lost shuffle connection surfaces
/// through the producer's own reconnect path rather than stalling the
/// emitting worker thread (mirrors `ProducerHandle::run`'s own
/// warn-and-drop behaviour on a transient send failure).
pub struct NetworkSink {
    producer: Arc<ProducerHandle>,
    next_sequence: AtomicU64,
}

impl NetworkSink {
    pub fn new(producer: Arc<ProducerHandle>) -> Arc<Self> {
        Arc::new(Self {
            producer,
            next_sequence: AtomicU64::new(0),
        })
    }

    pub fn start_buffering(&self) -> Result<(), tidal_network::NetworkError> {
        self.producer.start_buffering()
    }

    pub fn stop_buffering(&self) -> Result<(), tidal_network::NetworkError> {
        self.producer.stop_buffering()
    }

    pub fn reconfigure_peer(&self, new_peer: NodeLocation) -> Result<(), tidal_network::NetworkError> {
        self.producer.reconfigure_peer(new_peer)
    }
}

impl tidal_source::DataEmitter for NetworkSink {
    fn emit(&self, buffer: TupleBuffer) {
        let seq = SequenceNumber(self.next_sequence.fetch_add(1, Ordering::Relaxed));
        if let Err(err) = self.producer.write_data(seq, buffer) {
            warn!(partition = %self.producer.partition_id(), %err, "network sink failed to forward buffer");
        }
    }

    fn emit_end_of_stream(&self, termination_kind: TerminationKind) {
        if let Err(err) = self.producer.write_end_of_stream(termination_kind) {
            warn!(partition = %self.producer.partition_id(), %err, "network sink failed to forward end-of-stream");
        }
    }
}
