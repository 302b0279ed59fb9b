use serde::{Deserialize, Serialize};

use crate::ids::{OperatorId, QueryId, SubPlanId};

/// Guarantee the sub-plan offers downstream. Only `None` is implemented by
/// the core; the other variants are accepted and recorded but otherwise
/// inert, matching the source's own "only NONE is implemented" posture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultToleranceMode {
    None,
    AtLeastOnce,
    ExactlyOnce,
}

impl Default for FaultToleranceMode {
    fn default() -> Self {
        FaultToleranceMode::None
    }
}

/// Sub-plan lifecycle status. Transitions are driven exclusively by the
/// query manager; operators never set this directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubPlanStatus {
    Created,
    Deployed,
    Running,
    Stopped,
    Finished,
    ErrorState,
    Invalid,
}

impl SubPlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubPlanStatus::Stopped | SubPlanStatus::Finished | SubPlanStatus::ErrorState
        )
    }
}

/// How a stop request (or an EoS) should be carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationKind {
    /// Let in-flight tuples drain; sources stop producing, sinks flush.
    Graceful,
    /// Stop sources immediately; sinks flush what they already hold.
    HardStop,
    /// Like `HardStop`, but marks the sub-plan (and, per policy, its
    /// siblings) as failed.
    Failure,
}

/// Identity of a compiled, deployable fragment of a shared query.
///
/// The DAG of pipelines/operators itself is out of scope for the core (it is
/// produced by the optimizer); the engine only needs this header to route
/// lifecycle events and statistics.
#[derive(Clone, Debug)]
pub struct ExecutableSubPlan {
    pub query_id: QueryId,
    pub sub_plan_id: SubPlanId,
    pub fault_tolerance_mode: FaultToleranceMode,
    pub source_operator_ids: Vec<OperatorId>,
    pub sink_operator_ids: Vec<OperatorId>,
}

impl ExecutableSubPlan {
    pub fn new(query_id: QueryId, sub_plan_id: SubPlanId) -> Self {
        Self {
            query_id,
            sub_plan_id,
            fault_tolerance_mode: FaultToleranceMode::None,
            source_operator_ids: Vec::new(),
            sink_operator_ids: Vec::new(),
        }
    }

    pub fn with_source(mut self, operator_id: OperatorId) -> Self {
        self.source_operator_ids.push(operator_id);
        self
    }

    pub fn with_sink(mut self, operator_id: OperatorId) -> Self {
        self.sink_operator_ids.push(operator_id);
        self
    }

    pub fn key(&self) -> (QueryId, SubPlanId) {
        (self.query_id, self.sub_plan_id)
    }
}
