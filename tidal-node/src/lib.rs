//! The process-local façade tying every other crate in this workspace into
//! one running node (§4.1, §4.8): [`NodeEngine`] composes the buffer pool,
//! the network manager, and the worker pool, and exposes the narrow
//! register/start/stop/undeploy surface a query coordinator drives a
//! sub-plan's lifecycle through. [`spec::OperatorSpec`] and
//! [`sources::install_source`] are the two places a sub-plan's compiled
//! shape turns into running `tidal-engine` wiring.

mod engine;
mod error;
mod inlet;
mod origin_tracker;
mod output;
mod pipeline;
mod sources;
mod spec;

pub use engine::NodeEngine;
pub use error::NodeError;
pub use origin_tracker::OriginTracker;
pub use output::OutputSink;
pub use pipeline::{JoinPipeline, PassthroughPipeline, WindowPipeline};
pub use sources::{install_source, SourceHandle};
pub use spec::{build_executor, OperatorSpec, WindowAggregate};
