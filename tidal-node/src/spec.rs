// The part of a compiled sub-plan this crate actually knows how to execute:
// one windowed aggregation or one streaming hash join (§4.5, §4.6). A real
// optimizer's serialized operator tree, and transcoding one into this shape,
// is out of scope (§1) — callers build an `OperatorSpec` directly, the way
// `tidal-engine`'s own tests build an `ExecutableSubPlan` directly.

use std::sync::Arc;

use tidal_join::StreamingHashJoinOperator;
use tidal_types::OriginId;
use tidal_window::{
    AvgAggregator, CountAggregator, MaxAggregator, MinAggregator, SumAggregator, WindowDefinition,
    WindowOperator,
};

use crate::output::OutputSink;
use crate::pipeline::{JoinPipeline, PassthroughPipeline, WindowPipeline};

/// Which aggregate a windowed sub-plan computes, and over which field (§4.5).
#[derive(Clone, Debug)]
pub enum WindowAggregate {
    Count,
    Sum { field: String },
    Min { field: String },
    Max { field: String },
    Avg { field: String },
}

/// What one sub-plan's operator stage does, independent of how its inputs
/// and outputs are wired (§4.5, §4.6).
pub enum OperatorSpec {
    /// No operator stage: every origin's records are forwarded to `output`
    /// as soon as they are decoded. Multiple origins wired to the same
    /// sub-plan union here, since nothing filters by origin (§8 scenario 5).
    Passthrough,
    Window {
        aggregate: WindowAggregate,
        definition: WindowDefinition,
        /// `Some(field)` groups by that field's value per §4.5's keyed
        /// windows; `None` is the non-keyed, whole-stream aggregation.
        key_field: Option<String>,
    },
    Join {
        definition: WindowDefinition,
        num_partitions: usize,
        num_buckets: usize,
        left_key_field: String,
        right_key_field: String,
        left_origins: Vec<OriginId>,
        right_origins: Vec<OriginId>,
    },
}

macro_rules! window_pipeline {
    ($aggregator:expr, $definition:expr, $key_field:expr, $output:expr) => {{
        let operator = match &$key_field {
            Some(_) => WindowOperator::keyed($aggregator, $definition),
            None => WindowOperator::non_keyed($aggregator, $definition),
        };
        WindowPipeline::new(operator, $key_field, $output)
    }};
}

/// Builds the concrete `PipelineExecutor` a sub-plan's tasks are dispatched
/// against (§4.8), from an [`OperatorSpec`] and the [`OutputSink`] its
/// results are forwarded to.
pub fn build_executor(spec: OperatorSpec, output: OutputSink) -> Arc<dyn tidal_engine::PipelineExecutor> {
    match spec {
        OperatorSpec::Passthrough => PassthroughPipeline::new(output),
        OperatorSpec::Window { aggregate, definition, key_field } => match aggregate {
            WindowAggregate::Count => window_pipeline!(CountAggregator, definition, key_field, output),
            WindowAggregate::Sum { field } => window_pipeline!(SumAggregator { field }, definition, key_field, output),
            WindowAggregate::Min { field } => window_pipeline!(MinAggregator { field }, definition, key_field, output),
            WindowAggregate::Max { field } => window_pipeline!(MaxAggregator { field }, definition, key_field, output),
            WindowAggregate::Avg { field } => window_pipeline!(AvgAggregator { field }, definition, key_field, output),
        },
        OperatorSpec::Join {
            definition,
            num_partitions,
            num_buckets,
            left_key_field,
            right_key_field,
            left_origins,
            right_origins,
        } => {
            let operator = StreamingHashJoinOperator::new(
                definition,
                num_partitions,
                num_buckets,
                left_key_field,
                right_key_field,
            );
            JoinPipeline::new(operator, left_origins, right_origins, output)
        }
    }
}
