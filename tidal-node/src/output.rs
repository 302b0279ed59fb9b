// Where a pipeline's materialized records go (§4.8, §6 `SinkDescriptor`):
// either straight to a `RecordSink` (File/Print/NullOutput) or re-encoded
// into a `TupleBuffer` and handed to a `DataEmitter` bound to a network
// partition (`SinkDescriptor::Network`).

use std::sync::Arc;

use tracing::error;

use tidal_buffer::BufferPool;
use tidal_types::{Record, TerminationKind};

pub enum OutputSink {
    Records(Arc<dyn tidal_io::RecordSink>),
    Network {
        emitter: Arc<dyn tidal_source::DataEmitter>,
        buffer_pool: Arc<BufferPool>,
    },
}

impl OutputSink {
    /// No-op on an empty batch: a watermark tick with nothing to emit should
    /// not acquire a buffer or touch the sink.
    pub fn send_records(&self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        match self {
            OutputSink::Records(sink) => sink.write(&records),
            OutputSink::Network { emitter, buffer_pool } => {
                let buffer = match buffer_pool.get_buffer_blocking() {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        error!(%err, "failed to acquire output buffer for network sink");
                        return;
                    }
                };
                if let Err(err) = tidal_io::encode_into(&buffer, &records) {
                    error!(%err, "failed to encode pipeline output for network sink");
                    return;
                }
                emitter.emit(buffer);
            }
        }
    }

    pub fn send_end_of_stream(&self, termination_kind: TerminationKind) {
        if let OutputSink::Network { emitter, .. } = self {
            emitter.emit_end_of_stream(termination_kind);
        }
    }
}
