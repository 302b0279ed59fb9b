use std::fmt;

use crate::ids::{QueryId, SubPlanId};
use crate::subplan::SubPlanStatus;

/// Whether an error is recoverable at (or below) the channel boundary, or
/// must promote the owning sub-plan to `ErrorState`. Every per-crate error
/// enum implements [`ErrorSeverity`] so the query manager can decide, without
/// downcasting, whether to retry or to fail the sub-plan (§7).
pub trait ErrorSeverity {
    fn is_fatal(&self) -> bool;
}

/// Notification delivered to the status listener on every sub-plan status
/// transition: `(queryId, subPlanId, newStatus, reason)`.
#[derive(Clone, Debug)]
pub struct StatusUpdate {
    pub query_id: QueryId,
    pub sub_plan_id: SubPlanId,
    pub new_status: SubPlanStatus,
    pub reason: Option<String>,
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(
                f,
                "{}/{} -> {:?} ({reason})",
                self.query_id, self.sub_plan_id, self.new_status
            ),
            None => write!(
                f,
                "{}/{} -> {:?}",
                self.query_id, self.sub_plan_id, self.new_status
            ),
        }
    }
}
