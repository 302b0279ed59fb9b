// Translates one upstream origin's buffer/EoS traffic into worker-pool
// tasks for a sub-plan (§4.8, §5): wraps whichever of the two `DataEmitter`
// traits the origin's transport speaks (source thread or network consumer),
// tagging every buffer with the origin it came from so `PipelineExecutor`s
// get an accurate per-origin `Task::Data`, and rolling EoS reports up
// through a shared `OriginTracker`.

use std::sync::Arc;

use tidal_engine::{ReconfigurationMessage, Task, WorkerPool};
use tidal_types::{OriginId, SequenceNumber, SubPlanId, TerminationKind, TupleBuffer};

use crate::origin_tracker::OriginTracker;

pub struct SourceInlet {
    origin_id: OriginId,
    sub_plan_id: SubPlanId,
    pool: Arc<WorkerPool>,
    tracker: Arc<OriginTracker>,
}

impl SourceInlet {
    pub fn new(
        origin_id: OriginId,
        sub_plan_id: SubPlanId,
        pool: Arc<WorkerPool>,
        tracker: Arc<OriginTracker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            origin_id,
            sub_plan_id,
            pool,
            tracker,
        })
    }

    fn submit_data(&self, sequence: SequenceNumber, buffer: TupleBuffer) {
        self.pool.submit(Task::Data {
            sub_plan_id: self.sub_plan_id,
            origin_id: self.origin_id,
            sequence,
            buffer,
        });
    }

    fn observe_eos(&self, kind: TerminationKind) {
        if self.tracker.observe_eos(self.origin_id) {
            self.pool.submit(Task::Reconfigure {
                sub_plan_id: self.sub_plan_id,
                message: ReconfigurationMessage::Stop(kind),
            });
        }
    }
}

impl tidal_source::DataEmitter for SourceInlet {
    fn emit(&self, buffer: TupleBuffer) {
        let sequence = buffer.sequence_number();
        self.submit_data(sequence, buffer);
    }

    fn emit_end_of_stream(&self, termination_kind: TerminationKind) {
        self.observe_eos(termination_kind);
    }
}

impl tidal_network::DataEmitter for SourceInlet {
    fn emit(&self, seq: SequenceNumber, buffer: TupleBuffer) {
        self.submit_data(seq, buffer);
    }

    fn end_of_stream(&self, termination_kind: TerminationKind) {
        self.observe_eos(termination_kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_config::QueueingMode;
    use tidal_types::OriginId;

    #[test]
    fn single_origin_eos_submits_exactly_one_stop_task() {
        use tidal_source::DataEmitter as SourceDataEmitter;

        let pool = WorkerPool::start(1, QueueingMode::Global);
        let tracker = Arc::new(OriginTracker::new([OriginId(1)]));
        let inlet = SourceInlet::new(OriginId(1), SubPlanId(1), pool.clone(), tracker);

        SourceDataEmitter::emit_end_of_stream(&*inlet, TerminationKind::Graceful);
        pool.shutdown();
    }
}
