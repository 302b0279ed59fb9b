// Installs a window or hash-join operator between a sub-plan's inlets and
// its `OutputSink` (§4.8): decodes each task's buffer back into `Record`s,
// drives the operator, and re-encodes whatever it emits. These are the two
// `PipelineExecutor` implementations `NodeEngine` wires sub-plans against;
// a full multi-operator DAG compiler is out of scope (§1, "serialized
// operator tree... transcoding itself is out of scope") — each sub-plan here
// installs exactly one operator stage, matching the single-operator window
// and join scenarios the rest of this workspace already implements and
// tests end to end.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, warn};

use tidal_engine::{PipelineExecutor, ReconfigurationMessage};
use tidal_join::{JoinOutput, JoinSide, StreamingHashJoinOperator};
use tidal_types::{GroupKey, OriginId, Record, SequenceNumber, TerminationKind, TimestampMs, TupleBuffer, Value};
use tidal_window::{Aggregator, WindowOperator, WindowResult};

use crate::output::OutputSink;

fn window_result_to_record(result: WindowResult, key_field: Option<&str>) -> Record {
    let mut record = Record::new("window_start")
        .with_field("window_start", Value::U64(result.start))
        .with_field("window_end", Value::U64(result.end))
        .with_field("value", result.value);
    if let (Some(field), Some(key)) = (key_field, result.key) {
        if let Some(value) = key.values().first() {
            record = record.with_field(field, value.clone());
        }
    }
    record
}

fn join_output_to_record(output: JoinOutput) -> Record {
    output
        .record
        .with_field("window_start", Value::U64(output.window_start))
        .with_field("window_end", Value::U64(output.window_end))
        .with_field("join_key", output.join_key)
}

/// Drives a windowed aggregation over one or more upstream origins' worth of
/// `Record`s, emitting each closed window's result to `output` (§4.5, §4.8).
/// Per §5, "a downstream operator computes its effective watermark as the
/// minimum over all upstream origins": a window only closes once every
/// origin this pipeline has seen data from has advanced past its end, so one
/// slow origin can't let another's late data miss the window it belongs to.
pub struct WindowPipeline<A: Aggregator + Clone> {
    operator: WindowOperator<A>,
    key_field: Option<String>,
    output: OutputSink,
    origin_watermarks: Mutex<HashMap<OriginId, TimestampMs>>,
}

impl<A: Aggregator + Clone> WindowPipeline<A> {
    pub fn new(operator: WindowOperator<A>, key_field: Option<String>, output: OutputSink) -> Arc<Self> {
        Arc::new(Self {
            operator,
            key_field,
            output,
            origin_watermarks: Mutex::new(HashMap::new()),
        })
    }

    /// Records `origin`'s watermark and returns the effective (minimum
    /// across known origins) watermark, per §5.
    fn record_watermark(&self, origin_id: OriginId, watermark: TimestampMs) -> TimestampMs {
        let mut watermarks = self.origin_watermarks.lock();
        let entry = watermarks.entry(origin_id).or_insert(0);
        if watermark > *entry {
            *entry = watermark;
        }
        watermarks.values().copied().min().unwrap_or(0)
    }

    fn emit_ready(&self, watermark: TimestampMs) {
        let results = self.operator.on_watermark(watermark);
        if results.is_empty() {
            return;
        }
        let field = self.key_field.as_deref();
        let records = results.into_iter().map(|r| window_result_to_record(r, field)).collect();
        self.output.send_records(records);
    }
}

impl<A: Aggregator + Clone + 'static> PipelineExecutor for WindowPipeline<A> {
    fn execute_data(&self, origin_id: OriginId, _sequence: SequenceNumber, buffer: TupleBuffer) {
        let records = match tidal_io::decode_from(&buffer) {
            Ok(records) => records,
            Err(err) => {
                error!(%err, "failed to decode buffer for window pipeline");
                return;
            }
        };

        for record in &records {
            let result = match &self.key_field {
                Some(field) => match record.get(field) {
                    Some(value) => self.operator.execute(GroupKey::single(value.clone()), record),
                    None => {
                        warn!(field, "record missing window key field, dropped");
                        continue;
                    }
                },
                None => self.operator.execute_non_keyed(record),
            };
            if let Err(err) = result {
                error!(%err, "window operator rejected record");
            }
        }

        let effective_watermark = self.record_watermark(origin_id, buffer.watermark());
        self.emit_ready(effective_watermark);
    }

    fn handle_reconfiguration(&self, message: &ReconfigurationMessage) {
        if let ReconfigurationMessage::Stop(kind) = message {
            // Force every window still open to close, regardless of whether
            // the last observed watermark actually reached it: a graceful
            // stop must drain everything the operator is holding.
            self.emit_ready(TimestampMs::MAX);
            self.output.send_end_of_stream(*kind);
        }
    }
}

/// Drives a streaming hash join across its two upstream origins (§4.6,
/// §4.8): each origin is pinned to a [`JoinSide`] at construction, since the
/// join operator itself has no notion of which side a buffer came from.
pub struct JoinPipeline {
    operator: StreamingHashJoinOperator,
    sides: HashMap<OriginId, JoinSide>,
    output: OutputSink,
}

impl JoinPipeline {
    pub fn new(
        operator: StreamingHashJoinOperator,
        left_origins: impl IntoIterator<Item = OriginId>,
        right_origins: impl IntoIterator<Item = OriginId>,
        output: OutputSink,
    ) -> Arc<Self> {
        let mut sides = HashMap::new();
        for origin in left_origins {
            sides.insert(origin, JoinSide::Left);
        }
        for origin in right_origins {
            sides.insert(origin, JoinSide::Right);
        }
        Arc::new(Self { operator, sides, output })
    }

    fn probe_and_emit(&self, ready: Vec<Arc<tidal_join::HashJoinWindow>>) {
        for window in ready {
            let mut records = Vec::new();
            for p in 0..window.num_partitions() {
                match self.operator.probe_partition(&window, p) {
                    Ok(outputs) => records.extend(outputs.into_iter().map(join_output_to_record)),
                    Err(err) => error!(%err, "failed to probe join partition"),
                }
            }
            self.output.send_records(records);
            self.operator.retire_if_drained(window.start());
        }
    }
}

impl PipelineExecutor for JoinPipeline {
    fn execute_data(&self, origin_id: OriginId, _sequence: SequenceNumber, buffer: TupleBuffer) {
        let Some(&side) = self.sides.get(&origin_id) else {
            warn!(%origin_id, "buffer from an origin not wired to either join side, dropped");
            return;
        };

        let records = match tidal_io::decode_from(&buffer) {
            Ok(records) => records,
            Err(err) => {
                error!(%err, "failed to decode buffer for join pipeline");
                return;
            }
        };

        for record in records {
            if let Err(err) = self.operator.execute(side, record) {
                error!(%err, "join operator rejected record");
            }
        }

        let watermark = buffer.watermark();
        let ready = self.operator.advance_watermark(side, watermark);
        self.probe_and_emit(ready);
    }

    fn handle_reconfiguration(&self, message: &ReconfigurationMessage) {
        if let ReconfigurationMessage::Stop(kind) = message {
            let ready = self.operator.advance_watermark(JoinSide::Left, TimestampMs::MAX);
            let mut ready = ready;
            ready.extend(self.operator.advance_watermark(JoinSide::Right, TimestampMs::MAX));
            self.probe_and_emit(ready);
            self.output.send_end_of_stream(*kind);
        }
    }
}

/// Forwards every decoded record straight to `output` with no operator
/// stage in between (§4.8's data path: "source driver → local pipeline
/// tasks → sink" has no windowing or join step unless the sub-plan's
/// operator tree names one). Several origins wired to the same sub-plan
/// union automatically: the worker pool already fans every origin's tasks
/// into this one executor (§8 scenario 5).
pub struct PassthroughPipeline {
    output: OutputSink,
}

impl PassthroughPipeline {
    pub fn new(output: OutputSink) -> Arc<Self> {
        Arc::new(Self { output })
    }
}

impl PipelineExecutor for PassthroughPipeline {
    fn execute_data(&self, _origin_id: OriginId, _sequence: SequenceNumber, buffer: TupleBuffer) {
        match tidal_io::decode_from(&buffer) {
            Ok(records) => self.output.send_records(records),
            Err(err) => error!(%err, "failed to decode buffer for passthrough pipeline"),
        }
    }

    fn handle_reconfiguration(&self, message: &ReconfigurationMessage) {
        if let ReconfigurationMessage::Stop(kind) = message {
            self.output.send_end_of_stream(*kind);
        }
    }
}

#[cfg(test)]
mod window_pipeline_tests {
    use std::sync::Mutex as StdMutex;

    use tidal_window::{CountAggregator, WindowDefinition, WindowOperator};

    use super::*;

    struct CollectingSink {
        records: StdMutex<Vec<Record>>,
    }

    impl tidal_io::RecordSink for CollectingSink {
        fn write(&self, records: &[Record]) {
            self.records.lock().unwrap().extend_from_slice(records);
        }
    }

    fn buffer_with(origin: OriginId, watermark: TimestampMs, records: &[Record]) -> TupleBuffer {
        let buffer = TupleBuffer::for_test(Vec::new());
        tidal_io::encode_into(&buffer, records).unwrap();
        buffer.stamp(origin, SequenceNumber(1), watermark, 0);
        buffer
    }

    /// §5: "effective watermark is the minimum over all upstream origins."
    /// Two origins feed one non-keyed tumbling-count window; the faster
    /// origin's watermark alone must not close a window the slower origin
    /// could still land a record in.
    #[test]
    fn a_window_only_closes_once_every_known_origin_has_advanced_past_its_end() {
        let operator = WindowOperator::non_keyed(CountAggregator, WindowDefinition::tumbling(1000));
        let sink = Arc::new(CollectingSink {
            records: StdMutex::new(Vec::new()),
        });
        let pipeline = WindowPipeline::new(operator, None, OutputSink::Records(sink.clone()));

        let fast = OriginId(1);
        let slow = OriginId(2);
        let rec = |ts: u64| Record::new("ts").with_field("ts", Value::U64(ts)).with_field("value", Value::U64(1));

        pipeline.execute_data(fast, SequenceNumber(1), buffer_with(fast, 2500, &[rec(500)]));
        assert!(
            sink.records.lock().unwrap().is_empty(),
            "origin 2 hasn't been heard from yet, effective watermark is still 0"
        );

        pipeline.execute_data(slow, SequenceNumber(1), buffer_with(slow, 500, &[rec(600)]));
        assert!(
            sink.records.lock().unwrap().is_empty(),
            "effective watermark is min(2500, 500) = 500, short of the window's 1000 end"
        );

        pipeline.execute_data(slow, SequenceNumber(2), buffer_with(slow, 1000, &[rec(900)]));
        assert_eq!(sink.records.lock().unwrap().len(), 1, "effective watermark now min(2500, 1000) = 1000");
    }
}

#[cfg(test)]
mod union_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use tidal_config::{QueueingMode, SourceConfig};
    use tidal_engine::WorkerPool;
    use tidal_types::{OriginId, SubPlanId, Value};

    use super::*;
    use crate::inlet::SourceInlet;
    use crate::origin_tracker::OriginTracker;

    /// Collects every record handed to it; stands in for a real sink so the
    /// union test can assert on exactly what arrived.
    struct CollectingSink {
        records: StdMutex<Vec<Record>>,
    }

    impl tidal_io::RecordSink for CollectingSink {
        fn write(&self, records: &[Record]) {
            self.records.lock().unwrap().extend_from_slice(records);
        }
    }

    fn lambda_driver(
        origin_id: OriginId,
        buffer_pool: &tidal_buffer::BufferPool,
        sub_plan_id: SubPlanId,
        pool: Arc<WorkerPool>,
        tracker: Arc<OriginTracker>,
        buffers_to_produce: u64,
    ) -> Arc<tidal_source::SourceDriver> {
        let source_pool = buffer_pool.create_fixed_size_buffer_pool(4);
        let inlet = SourceInlet::new(origin_id, sub_plan_id, pool, tracker);
        let successors: Vec<Arc<dyn tidal_source::DataEmitter>> = vec![inlet];
        let produced = AtomicUsize::new(0);
        let receiver = Box::new(tidal_io::LambdaSource::new(origin_id, move || {
            let n = produced.fetch_add(1, Ordering::SeqCst);
            if n as u64 >= buffers_to_produce {
                return None;
            }
            Some(vec![Record::new("id")
                .with_field("id", Value::U64(1))
                .with_field("value", Value::U64(1))])
        }));
        let config = SourceConfig {
            number_of_buffers_to_produce: buffers_to_produce,
            number_of_tuples_per_buffer: 1,
            gathering_interval_ms: 0,
            ..Default::default()
        };
        tidal_source::SourceDriver::new(origin_id, config, source_pool, successors, receiver, 1)
    }

    /// §8 scenario 5: two sources ("car", "truck") each produce 30 buffers
    /// of one tuple; the union sub-plan's sink sees all 60, with no
    /// per-origin filtering.
    #[test]
    fn union_of_two_sources_delivers_every_tuple_to_the_sink() {
        let buffer_pool = tidal_buffer::BufferPool::new(64, 256);
        let worker_pool = WorkerPool::start(2, QueueingMode::Global);
        let sub_plan_id = SubPlanId(1);

        let car = OriginId(1);
        let truck = OriginId(2);
        let tracker = Arc::new(OriginTracker::new([car, truck]));

        let sink = Arc::new(CollectingSink {
            records: StdMutex::new(Vec::new()),
        });
        let output = OutputSink::Records(sink.clone());
        let executor = PassthroughPipeline::new(output);
        worker_pool.register(sub_plan_id, executor);

        let car_driver = lambda_driver(car, &buffer_pool, sub_plan_id, worker_pool.clone(), tracker.clone(), 30);
        let truck_driver = lambda_driver(truck, &buffer_pool, sub_plan_id, worker_pool.clone(), tracker, 30);
        car_driver.start();
        truck_driver.start();

        // Both sources run to exhaustion on their own threads; block until
        // each has joined before asking the worker pool to drain.
        car_driver.stop(TerminationKind::Graceful);
        truck_driver.stop(TerminationKind::Graceful);
        worker_pool.shutdown();

        assert_eq!(sink.records.lock().unwrap().len(), 60);
    }
}
