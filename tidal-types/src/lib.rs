//! Shared data model for the Tidal stream-processing engine: identifiers,
//! the pooled [`TupleBuffer`] handle, sub-plan lifecycle types, windowing
//! metadata, and the logical [`Record`] abstraction operators work with.
//!
//! This crate has no opinion on networking, scheduling, or storage; it only
//! defines the vocabulary the other crates share.

mod buffer;
mod error;
mod ids;
mod record;
mod slice;
mod subplan;

pub use buffer::{BufferRecycler, TupleBuffer};
pub use error::{ErrorSeverity, StatusUpdate};
pub use ids::{
    NodeLocation, OperatorId, OriginId, PartitionId, QueryId, SequenceNumber, SubPlanId,
    TimestampMs,
};
pub use record::{GroupKey, Record, Value};
pub use slice::SliceMetaData;
pub use subplan::{ExecutableSubPlan, FaultToleranceMode, SubPlanStatus, TerminationKind};
