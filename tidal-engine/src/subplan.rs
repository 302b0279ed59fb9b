use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use tidal_types::{ExecutableSubPlan, SubPlanStatus};

use crate::stats::{StatsSnapshot, SubPlanStats};

/// Live state the query manager tracks for one registered sub-plan: its
/// immutable identity, its current lifecycle status (with a condvar other
/// threads can block on while waiting for a terminal status), and the
/// counters its worker-thread tasks update.
///
/// One `SubPlanHandle` is created by `registerSubPlan` and destroyed by
/// `deregisterSubPlan`; nothing else in the engine outlives it.
pub struct SubPlanHandle {
    pub plan: ExecutableSubPlan,
    status: Mutex<SubPlanStatus>,
    status_changed: Condvar,
    stats: Arc<SubPlanStats>,
}

impl SubPlanHandle {
    pub fn new(plan: ExecutableSubPlan, stats: Arc<SubPlanStats>) -> Self {
        Self {
            plan,
            status: Mutex::new(SubPlanStatus::Created),
            status_changed: Condvar::new(),
            stats,
        }
    }

    pub fn status(&self) -> SubPlanStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: SubPlanStatus) {
        let mut guard = self.status.lock();
        *guard = status;
        self.status_changed.notify_all();
    }

    /// Blocks the calling thread until the sub-plan reaches a terminal
    /// status or `timeout` elapses, returning the status observed either
    /// way (§9 "coroutine-style blocking stop()", made finite per §4.3).
    pub fn wait_for_terminal(&self, timeout: std::time::Duration) -> SubPlanStatus {
        let mut guard = self.status.lock();
        let deadline = std::time::Instant::now() + timeout;
        while !guard.is_terminal() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let timed_out = self.status_changed.wait_for(&mut guard, remaining).timed_out();
            if timed_out {
                break;
            }
        }
        *guard
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tidal_types::{OperatorId, QueryId, SubPlanId};

    use super::*;

    fn plan() -> ExecutableSubPlan {
        ExecutableSubPlan::new(QueryId(1), SubPlanId(1)).with_sink(OperatorId(1))
    }

    #[test]
    fn wait_for_terminal_returns_immediately_once_already_terminal() {
        let handle = SubPlanHandle::new(plan(), Arc::new(SubPlanStats::new()));
        handle.set_status(SubPlanStatus::Finished);
        let status = handle.wait_for_terminal(Duration::from_millis(50));
        assert_eq!(status, SubPlanStatus::Finished);
    }

    #[test]
    fn wait_for_terminal_times_out_if_never_reached() {
        let handle = SubPlanHandle::new(plan(), Arc::new(SubPlanStats::new()));
        let status = handle.wait_for_terminal(Duration::from_millis(20));
        assert_eq!(status, SubPlanStatus::Created);
    }

    #[test]
    fn wait_for_terminal_wakes_up_once_another_thread_sets_a_terminal_status() {
        let handle = Arc::new(SubPlanHandle::new(plan(), Arc::new(SubPlanStats::new())));
        let woke = Arc::new(AtomicBool::new(false));

        let handle2 = handle.clone();
        let woke2 = woke.clone();
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle2.set_status(SubPlanStatus::Stopped);
            woke2.store(true, Ordering::SeqCst);
        });

        let status = handle.wait_for_terminal(Duration::from_secs(2));
        setter.join().unwrap();
        assert_eq!(status, SubPlanStatus::Stopped);
        assert!(woke.load(Ordering::SeqCst));
    }
}
