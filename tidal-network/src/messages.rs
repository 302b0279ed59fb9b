use serde::{Deserialize, Serialize};

use tidal_types::{PartitionId, SequenceNumber, TerminationKind};

/// Control events multiplexed onto the `EVENT` stream of a channel (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Ask the sink to start queueing outgoing buffers instead of sending.
    StartBuffering,
    /// Ask the sink to drain its queue, in order, and resume sending live.
    StopBuffering,
}

/// The three wire-level error categories named in §4.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    /// The receiver has no consumer registered for this partition yet; the
    /// sender should retry.
    PartitionNotRegistered,
    /// The receiver's consumer was unregistered; the sender must abandon the
    /// channel rather than retry.
    DeletedPartitionError,
    /// Anything else: transport failure, protocol violation. Retried with
    /// backoff by the caller, but not distinguished further on the wire.
    NetworkError,
}

/// One message on a partition's multiplexed DATA/EVENT channel.
///
/// Framing on the wire is a `tokio_util` length-delimited frame around this
/// value serialized with `serde_json`; §4.2 only requires bit-exact framing
/// across interoperating engine versions of the same build, so the exact
/// encoding is an implementation detail of one engine version.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WireMessage {
    /// Sent by a producer immediately after connecting, before any data, so
    /// the consumer side can distinguish a fresh channel from a resumed one.
    AnnouncePartition { partition_id: PartitionId },
    DataBuffer {
        partition_id: PartitionId,
        seq: SequenceNumber,
        payload: Vec<u8>,
    },
    Event {
        partition_id: PartitionId,
        kind: EventKind,
    },
    EndOfStream {
        partition_id: PartitionId,
        termination_kind: TerminationKind,
    },
    Error {
        kind: WireErrorKind,
        channel_id: u64,
    },
}

impl WireMessage {
    pub fn partition_id(&self) -> Option<PartitionId> {
        match self {
            WireMessage::AnnouncePartition { partition_id }
            | WireMessage::DataBuffer { partition_id, .. }
            | WireMessage::Event { partition_id, .. }
            | WireMessage::EndOfStream { partition_id, .. } => Some(*partition_id),
            WireMessage::Error { .. } => None,
        }
    }
}
