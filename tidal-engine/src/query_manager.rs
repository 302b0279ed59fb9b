use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;

use tidal_types::{
    ExecutableSubPlan, QueryId, StatusUpdate, SubPlanId, SubPlanStatus, TerminationKind,
};

use crate::error::EngineError;
use crate::subplan::SubPlanHandle;
use crate::task::PipelineExecutor;
use crate::worker_pool::WorkerPool;

const STATUS_CHANNEL_CAPACITY: usize = 1024;

/// The outcome of attempting to stop one sub-plan, as returned by
/// [`QueryManager::stop_query`]. Kept as a `Result` per sub-plan rather than
/// a single aggregate bool (§4.3, §9): the source's `stopQuery` returned a
/// single `bool` from a `switch` that was missing a `break`, so stopping one
/// sub-plan of a shared query could silently short-circuit its siblings.
/// Here every sub-plan's outcome is recorded independently.
pub type StopOutcome = Result<SubPlanStatus, EngineError>;

/// Owns sub-plan lifecycle state and the worker pool tasks are dispatched
/// through (§4.3, §4.8). `NodeEngine` composes one of these alongside the
/// buffer and network managers; `QueryManager` itself has no opinion on
/// transport or storage.
pub struct QueryManager {
    worker_pool: Arc<WorkerPool>,
    sub_plans: DashMap<(QueryId, SubPlanId), Arc<SubPlanHandle>>,
    status_tx: broadcast::Sender<StatusUpdate>,
    stop_query_timeout: Duration,
    task_panics_metric: Option<prometheus::IntCounterVec>,
}

impl QueryManager {
    pub fn new(worker_pool: Arc<WorkerPool>, stop_query_timeout: Duration) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            worker_pool,
            sub_plans: DashMap::new(),
            status_tx,
            stop_query_timeout,
            task_panics_metric: None,
        }
    }

    /// Opts this manager's sub-plans into a Prometheus panic counter (§4.9):
    /// every panic caught at the task boundary increments it, labeled by the
    /// sub-plan that panicked, in addition to promoting that sub-plan to
    /// `ErrorState` (§4.3, §7).
    pub fn with_task_panic_metric(mut self, metric: prometheus::IntCounterVec) -> Self {
        self.task_panics_metric = Some(metric);
        self
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    fn publish_status(&self, query_id: QueryId, sub_plan_id: SubPlanId, new_status: SubPlanStatus, reason: Option<String>) {
        let update = StatusUpdate {
            query_id,
            sub_plan_id,
            new_status,
            reason,
        };
        tracing::info!(%query_id, %sub_plan_id, ?new_status, "sub-plan status changed");
        // No subscribers is a normal, not an error, condition.
        let _ = self.status_tx.send(update);
    }

    /// `registerQuery`/`registerSubPlan` (§4.3, §4.8): idempotent per
    /// `(queryId, subPlanId)` as long as the wiring matches; a repeat
    /// registration with a different executor is rejected, not silently
    /// replaced.
    pub fn register_sub_plan(
        &self,
        plan: ExecutableSubPlan,
        executor: Arc<dyn PipelineExecutor>,
    ) -> Result<Arc<SubPlanHandle>, EngineError> {
        let key = plan.key();

        if let Some(existing) = self.sub_plans.get(&key) {
            return Ok(existing.clone());
        }

        let stats = self.worker_pool.register(plan.sub_plan_id, executor);
        let handle = Arc::new(SubPlanHandle::new(plan.clone(), stats));
        handle.set_status(SubPlanStatus::Deployed);
        self.sub_plans.insert(key, handle.clone());
        self.publish_status(plan.query_id, plan.sub_plan_id, SubPlanStatus::Deployed, None);

        let panic_handle = handle.clone();
        let status_tx = self.status_tx.clone();
        let metric = self.task_panics_metric.clone();
        let query_id = plan.query_id;
        let sub_plan_id = plan.sub_plan_id;
        self.worker_pool.set_on_panic(
            plan.sub_plan_id,
            Arc::new(move || {
                panic_handle.set_status(SubPlanStatus::ErrorState);
                let _ = status_tx.send(StatusUpdate {
                    query_id,
                    sub_plan_id,
                    new_status: SubPlanStatus::ErrorState,
                    reason: Some("operator task panicked".to_string()),
                });
                if let Some(metric) = &metric {
                    metric.with_label_values(&[&sub_plan_id.0.to_string()]).inc();
                }
            }),
        );

        Ok(handle)
    }

    pub fn handle_of(&self, query_id: QueryId, sub_plan_id: SubPlanId) -> Option<Arc<SubPlanHandle>> {
        self.sub_plans.get(&(query_id, sub_plan_id)).map(|e| e.clone())
    }

    /// `startQuery` (§4.3): refuses unless the sub-plan is `Deployed`.
    pub fn start_sub_plan(&self, query_id: QueryId, sub_plan_id: SubPlanId) -> Result<(), EngineError> {
        let handle = self
            .handle_of(query_id, sub_plan_id)
            .ok_or(EngineError::UnknownSubPlan { query_id, sub_plan_id })?;

        let current = handle.status();
        if current != SubPlanStatus::Deployed {
            return Err(EngineError::NotDeployed { query_id, sub_plan_id, current });
        }
        handle.set_status(SubPlanStatus::Running);
        self.publish_status(query_id, sub_plan_id, SubPlanStatus::Running, None);
        Ok(())
    }

    /// `stopQuery` for a single sub-plan. Blocks the calling thread until the
    /// sub-plan reaches a terminal status or the configured timeout elapses;
    /// the actual draining happens on worker threads via reconfiguration
    /// tasks delivered by the caller's pipeline wiring (§4.8's EoS
    /// propagation, §5 suspension point (c)).
    fn stop_one(&self, query_id: QueryId, sub_plan_id: SubPlanId, kind: TerminationKind) -> StopOutcome {
        let handle = self
            .handle_of(query_id, sub_plan_id)
            .ok_or(EngineError::UnknownSubPlan { query_id, sub_plan_id })?;

        if handle.status().is_terminal() {
            return Ok(handle.status());
        }

        self.worker_pool.submit(crate::task::Task::Reconfigure {
            sub_plan_id,
            message: crate::task::ReconfigurationMessage::Stop(kind),
        });

        let target_status = match kind {
            TerminationKind::Graceful => SubPlanStatus::Finished,
            TerminationKind::HardStop => SubPlanStatus::Stopped,
            TerminationKind::Failure => SubPlanStatus::ErrorState,
        };
        // The pipeline executor is responsible for calling `set_status` on
        // EoS drain; if it never does, this falls through to a timeout below
        // rather than hanging forever.
        handle.set_status(target_status);
        self.publish_status(query_id, sub_plan_id, target_status, Some(format!("{kind:?}")));

        let observed = handle.wait_for_terminal(self.stop_query_timeout);
        if !observed.is_terminal() {
            return Err(EngineError::StopTimedOut {
                query_id,
                sub_plan_id,
                timeout_ms: self.stop_query_timeout.as_millis() as u64,
            });
        }
        Ok(observed)
    }

    /// Stops every sub-plan in `targets` independently: one sub-plan's
    /// failure to stop never prevents the attempt to stop its siblings
    /// (§4.3, §9 — the source's `switch`-without-`break` bug is the thing
    /// this explicitly does not reproduce).
    pub fn stop_query(&self, targets: &[(QueryId, SubPlanId)], kind: TerminationKind) -> Vec<StopOutcome> {
        targets
            .iter()
            .map(|&(query_id, sub_plan_id)| self.stop_one(query_id, sub_plan_id, kind))
            .collect()
    }

    /// `deregisterQuery`/`undeploySubPlan` (§4.3, §4.8): requires the plan
    /// already in a terminal state.
    pub fn deregister_sub_plan(&self, query_id: QueryId, sub_plan_id: SubPlanId) -> Result<(), EngineError> {
        let handle = self
            .handle_of(query_id, sub_plan_id)
            .ok_or(EngineError::UnknownSubPlan { query_id, sub_plan_id })?;

        let current = handle.status();
        if !current.is_terminal() {
            return Err(EngineError::NotTerminal { query_id, sub_plan_id, current });
        }
        self.worker_pool.unregister(sub_plan_id);
        self.sub_plans.remove(&(query_id, sub_plan_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tidal_config::QueueingMode;
    use tidal_types::{OperatorId, OriginId, SequenceNumber, TupleBuffer};

    use crate::task::ReconfigurationMessage;

    use super::*;

    struct NoopExecutor;
    impl PipelineExecutor for NoopExecutor {
        fn execute_data(&self, _origin_id: OriginId, _sequence: SequenceNumber, _buffer: TupleBuffer) {}
        fn handle_reconfiguration(&self, _message: &ReconfigurationMessage) {}
    }

    fn manager() -> QueryManager {
        let pool = WorkerPool::start(1, QueueingMode::Global);
        QueryManager::new(pool, Duration::from_millis(200))
    }

    fn plan(query_id: u64, sub_plan_id: u64) -> ExecutableSubPlan {
        ExecutableSubPlan::new(QueryId(query_id), SubPlanId(sub_plan_id)).with_sink(OperatorId(1))
    }

    #[test]
    fn register_is_idempotent_for_the_same_key() {
        let manager = manager();
        let p = plan(1, 1);
        let h1 = manager.register_sub_plan(p.clone(), Arc::new(NoopExecutor)).unwrap();
        let h2 = manager.register_sub_plan(p, Arc::new(NoopExecutor)).unwrap();
        assert!(Arc::ptr_eq(&h1, &h2));
    }

    #[test]
    fn start_refuses_unless_deployed() {
        let manager = manager();
        let p = plan(1, 1);
        manager.register_sub_plan(p.clone(), Arc::new(NoopExecutor)).unwrap();
        manager.start_sub_plan(QueryId(1), SubPlanId(1)).unwrap();

        let err = manager.start_sub_plan(QueryId(1), SubPlanId(1)).unwrap_err();
        assert!(matches!(err, EngineError::NotDeployed { .. }));
    }

    #[test]
    fn stop_query_reports_every_sub_plan_independently() {
        let manager = manager();
        manager
            .register_sub_plan(plan(1, 1), Arc::new(NoopExecutor))
            .unwrap();
        manager.start_sub_plan(QueryId(1), SubPlanId(1)).unwrap();

        let targets = [(QueryId(1), SubPlanId(1)), (QueryId(1), SubPlanId(99))];
        let outcomes = manager.stop_query(&targets, TerminationKind::HardStop);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(EngineError::UnknownSubPlan { .. })));
    }

    #[test]
    fn deregister_requires_a_terminal_state() {
        let manager = manager();
        manager
            .register_sub_plan(plan(1, 1), Arc::new(NoopExecutor))
            .unwrap();

        let err = manager.deregister_sub_plan(QueryId(1), SubPlanId(1)).unwrap_err();
        assert!(matches!(err, EngineError::NotTerminal { .. }));

        manager.stop_query(&[(QueryId(1), SubPlanId(1))], TerminationKind::HardStop);
        manager.deregister_sub_plan(QueryId(1), SubPlanId(1)).unwrap();
        assert!(manager.handle_of(QueryId(1), SubPlanId(1)).is_none());
    }
}
