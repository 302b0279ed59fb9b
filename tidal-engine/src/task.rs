use tidal_types::{OriginId, SequenceNumber, SubPlanId, TerminationKind, TupleBuffer};

/// A control message interleaved with data tasks on the same queue, in FIFO
/// order relative to the data tasks of the sub-plan it targets (§4.3, §5).
#[derive(Clone, Debug)]
pub enum ReconfigurationMessage {
    /// Ask a network sink feeding this sub-plan to start queueing instead of
    /// sending (§4.2).
    StartBuffering,
    /// Ask it to resume, draining what it queued, in order.
    StopBuffering,
    /// Propagated stop request; the executor reacts by ceasing to accept new
    /// data and, once drained per `kind`, reporting back to the sub-plan
    /// handle so it can complete its stop.
    Stop(TerminationKind),
}

/// One unit of work a worker thread drains from a task queue (§4.3, §5): a
/// tuple buffer bound to one sub-plan's pipeline, tagged with the origin and
/// sequence number it arrived under so per-origin ordering can be checked,
/// or a reconfiguration message for that sub-plan.
#[derive(Clone, Debug)]
pub enum Task {
    Data {
        sub_plan_id: SubPlanId,
        origin_id: OriginId,
        sequence: SequenceNumber,
        buffer: TupleBuffer,
    },
    Reconfigure {
        sub_plan_id: SubPlanId,
        message: ReconfigurationMessage,
    },
}

impl Task {
    pub fn sub_plan_id(&self) -> SubPlanId {
        match self {
            Task::Data { sub_plan_id, .. } => *sub_plan_id,
            Task::Reconfigure { sub_plan_id, .. } => *sub_plan_id,
        }
    }
}

/// The compiled pipeline a sub-plan's tasks are executed against (§4.8): the
/// engine only knows how to route a [`Task`] to the right sub-plan and
/// catch panics at the task boundary (§7); what actually happens to a
/// buffer (windowing, joining, forwarding to a sink) is supplied by
/// whoever wires the sub-plan, via this trait.
pub trait PipelineExecutor: Send + Sync {
    fn execute_data(&self, origin_id: OriginId, sequence: SequenceNumber, buffer: TupleBuffer);

    fn handle_reconfiguration(&self, message: &ReconfigurationMessage);
}
