//! Partition-addressed shuffle fabric between workers (§4.2): a
//! [`NetworkManager`] owning the inbound server socket and every outbound
//! [`ProducerHandle`], a process-local [`PartitionManager`] tracking
//! consumer/producer registration, and the length-delimited [`WireCodec`]
//! the two sides speak over TCP.

mod codec;
mod emitter;
mod error;
mod framing;
mod manager;
mod messages;
mod producer;
mod registry;

pub use emitter::DataEmitter;
pub use error::NetworkError;
pub use manager::NetworkManager;
pub use messages::{EventKind, WireErrorKind, WireMessage};
pub use producer::ProducerHandle;
pub use registry::{PartitionManager, PartitionStatus};
