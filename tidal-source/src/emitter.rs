use tidal_types::{TerminationKind, TupleBuffer};

/// Where a source forwards stamped buffers and end-of-stream notifications
/// (§4.4 `emitWorkFromSource`/`emitWork`). One instance per downstream
/// successor; a source with several successors holds one `Arc<dyn
/// DataEmitter>` per successor and pushes to all of them.
pub trait DataEmitter: Send + Sync {
    fn emit(&self, buffer: TupleBuffer);
    fn emit_end_of_stream(&self, termination_kind: TerminationKind);
}
