//! Layered configuration for the Tidal engine: process-wide [`EngineConfig`],
//! per-physical-source [`SourceConfig`], and the sub-plan wire-format
//! descriptors (§6) that name a source/sink without specifying how the
//! optimizer produced them.

mod descriptors;
mod engine;
mod source;

pub use descriptors::{
    FileFormat, FileWriteMode, NetworkEndpoint, SinkDescriptor, SourceDescriptor,
};
pub use engine::{EngineConfig, JoinStrategy, QueueingMode, WindowingStrategy};
pub use source::{Framing, GatheringMode, InputFormat, SourceConfig, SourceType, TcpSourceOptions};
