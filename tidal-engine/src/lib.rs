//! Worker thread pool and sub-plan lifecycle (§4.3, §4.8): a fixed pool of
//! OS threads draining [`task::Task`]s from one or more queues, and the
//! [`QueryManager`] that drives each sub-plan through its
//! `Created → Deployed → Running → {Stopped, Finished, ErrorState}` states.
//!
//! This crate has no opinion on how a sub-plan's pipeline is wired together
//! (sources, operators, sinks) — it only dispatches tasks to whatever
//! [`task::PipelineExecutor`] a caller registered and tracks lifecycle
//! status and statistics. `tidal-node` composes this with the buffer,
//! network, and partition managers into the process-local façade.

pub mod error;
pub mod metrics;
pub mod query_manager;
pub mod stats;
pub mod subplan;
pub mod task;
pub mod worker_pool;

pub use error::EngineError;
pub use metrics::EngineMetrics;
pub use query_manager::{QueryManager, StopOutcome};
pub use stats::{StatsSnapshot, SubPlanStats};
pub use subplan::SubPlanHandle;
pub use task::{PipelineExecutor, ReconfigurationMessage, Task};
pub use worker_pool::WorkerPool;
