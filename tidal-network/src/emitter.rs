use tidal_types::{SequenceNumber, TerminationKind, TupleBuffer};

/// The sink a registered consumer exposes for inbound partition traffic.
/// `NetworkManager` calls this once per `DataBuffer` and once on
/// `EndOfStream`; it never calls it concurrently for the same partition
/// (ordering is preserved per-partition, per §4.2).
pub trait DataEmitter: Send + Sync {
    fn emit(&self, seq: SequenceNumber, buffer: TupleBuffer);

    fn end_of_stream(&self, termination_kind: TerminationKind);
}
