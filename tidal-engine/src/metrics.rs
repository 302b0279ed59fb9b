use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

/// Process-wide engine metrics, registered against a caller-supplied
/// `prometheus::Registry` (§4.9's logging section covers spans/events;
/// these are the engine's counterpart gauges/counters). Takes the registry
/// as a parameter rather than owning a global one, so multiple engines in
/// one process don't collide.
pub struct EngineMetrics {
    pub sub_plans_registered: IntCounterVec,
    pub sub_plans_running: IntGaugeVec,
    pub tasks_dispatched: IntCounterVec,
    pub task_panics: IntCounterVec,
    pub stop_query_timeouts: IntCounterVec,
}

impl EngineMetrics {
    pub fn new(registry: &Registry) -> Self {
        let sub_plans_registered = IntCounterVec::new(
            Opts::new("tidal_sub_plans_registered_total", "Sub-plans registered since start"),
            &["query_id"],
        )
        .unwrap();
        let sub_plans_running = IntGaugeVec::new(
            Opts::new("tidal_sub_plans_running", "Sub-plans currently in the Running status"),
            &["query_id"],
        )
        .unwrap();
        let tasks_dispatched = IntCounterVec::new(
            Opts::new("tidal_tasks_dispatched_total", "Tasks dispatched to a sub-plan's pipeline"),
            &["sub_plan_id"],
        )
        .unwrap();
        let task_panics = IntCounterVec::new(
            Opts::new("tidal_task_panics_total", "Operator panics caught at the task boundary"),
            &["sub_plan_id"],
        )
        .unwrap();
        let stop_query_timeouts = IntCounterVec::new(
            Opts::new("tidal_stop_query_timeouts_total", "stopQuery calls that exceeded their deadline"),
            &["sub_plan_id"],
        )
        .unwrap();

        registry
            .register(Box::new(sub_plans_registered.clone()))
            .expect("metric name collision registering EngineMetrics");
        registry
            .register(Box::new(sub_plans_running.clone()))
            .expect("metric name collision registering EngineMetrics");
        registry
            .register(Box::new(tasks_dispatched.clone()))
            .expect("metric name collision registering EngineMetrics");
        registry
            .register(Box::new(task_panics.clone()))
            .expect("metric name collision registering EngineMetrics");
        registry
            .register(Box::new(stop_query_timeouts.clone()))
            .expect("metric name collision registering EngineMetrics");

        Self {
            sub_plans_registered,
            sub_plans_running,
            tasks_dispatched,
            task_panics,
            stop_query_timeouts,
        }
    }
}
