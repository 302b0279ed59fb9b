use tidal_types::{ExecutableSubPlan, OperatorId, QueryId, SubPlanId};

/// A minimal, deterministic [`ExecutableSubPlan`] fixture: one source
/// operator (id 1) and one sink operator (id 2) under `(query_id,
/// sub_plan_id)`. Callers that need more operators extend the result with
/// `with_source`/`with_sink`.
pub fn test_sub_plan(query_id: u64, sub_plan_id: u64) -> ExecutableSubPlan {
    ExecutableSubPlan::new(QueryId(query_id), SubPlanId(sub_plan_id))
        .with_source(OperatorId(1))
        .with_sink(OperatorId(2))
}
