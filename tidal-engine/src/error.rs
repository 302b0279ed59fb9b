use thiserror::Error;

use tidal_types::{ErrorSeverity, OperatorId, QueryId, SubPlanId};

/// Errors raised by the query manager and node engine lifecycle (§4.3, §4.8,
/// §7). Most variants reject a caller's request without touching engine
/// state; `OperatorError`/`FatalEngineError` are the two that promote a
/// sub-plan to `ErrorState`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `registerSubPlan` was rejected because the worker pool has not been
    /// started yet.
    #[error("cannot register sub-plan {sub_plan_id} of query {query_id}: worker pool is not started")]
    WorkerPoolNotStarted {
        query_id: QueryId,
        sub_plan_id: SubPlanId,
    },

    /// `startQuery` was called on a sub-plan that isn't `Deployed`.
    #[error("sub-plan {sub_plan_id} of query {query_id} is not Deployed (current status: {current:?})")]
    NotDeployed {
        query_id: QueryId,
        sub_plan_id: SubPlanId,
        current: tidal_types::SubPlanStatus,
    },

    /// `deregisterSubPlan` was called on a sub-plan that has not reached a
    /// terminal status.
    #[error("sub-plan {sub_plan_id} of query {query_id} is not in a terminal state (current status: {current:?})")]
    NotTerminal {
        query_id: QueryId,
        sub_plan_id: SubPlanId,
        current: tidal_types::SubPlanStatus,
    },

    #[error("sub-plan {sub_plan_id} of query {query_id} is not registered")]
    UnknownSubPlan {
        query_id: QueryId,
        sub_plan_id: SubPlanId,
    },

    /// A duplicate `(queryId, subPlanId)` registration; per §4.3,
    /// `registerQuery` is idempotent, so this is returned only when the
    /// second registration disagrees with the first (different operator
    /// wiring), not on an exact repeat.
    #[error("sub-plan {sub_plan_id} of query {query_id} is already registered with different wiring")]
    ConflictingRegistration {
        query_id: QueryId,
        sub_plan_id: SubPlanId,
    },

    /// `stopQuery` did not observe completion within its configured
    /// deadline (§5 suspension points, §9 "coroutine-style blocking stop()").
    #[error("stop of sub-plan {sub_plan_id} of query {query_id} timed out after {timeout_ms}ms")]
    StopTimedOut {
        query_id: QueryId,
        sub_plan_id: SubPlanId,
        timeout_ms: u64,
    },

    /// An operator panicked while executing a task; caught at the task
    /// boundary per §7 and turned into this, never allowed to unwind past
    /// the worker thread.
    #[error("operator {operator_id} of sub-plan {sub_plan_id} of query {query_id} failed: {reason}")]
    OperatorError {
        query_id: QueryId,
        sub_plan_id: SubPlanId,
        operator_id: OperatorId,
        reason: String,
    },

    #[error("network manager error: {0}")]
    Network(#[from] tidal_network::NetworkError),

    #[error("buffer pool error: {0}")]
    Buffer(#[from] tidal_buffer::BufferError),

    /// Unrecoverable; per §5 failure model this is where a process-level
    /// error listener would take over.
    #[error("fatal engine error: {0}")]
    FatalEngineError(String),
}

impl ErrorSeverity for EngineError {
    fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::OperatorError { .. } | EngineError::FatalEngineError(_)
        )
    }
}
