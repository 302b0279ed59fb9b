// The process-local façade composing every other crate in this workspace
// into one running engine instance (§4.1, §4.3, §4.8), grounded on the
// teacher's `AuthorityNode::start`/`stop` pattern: one async constructor that
// wires the buffer pool, the network manager, and the worker pool together,
// and a handful of narrow methods for deploying, starting, and stopping
// sub-plans against it. Unlike `AuthorityNode`, a `NodeEngine` outlives any
// single query: sub-plans are registered and torn down against it
// throughout its lifetime rather than once at construction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use prometheus::Registry;
use tidal_types::{ExecutableSubPlan, NodeLocation, OriginId, PartitionId, QueryId, Record, SubPlanId, SubPlanStatus, TerminationKind};
use tracing::info;

use tidal_buffer::BufferPool;
use tidal_config::{EngineConfig, SinkDescriptor, SourceDescriptor};
use tidal_engine::{EngineMetrics, QueryManager, StatsSnapshot, SubPlanHandle, WorkerPool};
use tidal_network::NetworkManager;

use crate::error::NodeError;
use crate::origin_tracker::OriginTracker;
use crate::output::OutputSink;
use crate::sources::{self, SourceHandle};
use crate::spec::{self, OperatorSpec};

/// Everything a registered sub-plan's sources need torn down on undeploy:
/// the shared [`OriginTracker`] fed by all of them, and each source's handle
/// paired with the inbound partition it occupies, if any (so the
/// `NetworkManager` registration can be released too).
struct SubPlanResources {
    tracker: Arc<OriginTracker>,
    sources: Vec<(SourceHandle, Option<PartitionId>)>,
}

/// One running Tidal engine instance. Composes a [`BufferPool`], a
/// [`NetworkManager`], a [`WorkerPool`]-backed [`QueryManager`], and
/// [`EngineMetrics`] (§4.1, §4.2, §4.3, §4.9) under a single `data_port`.
pub struct NodeEngine {
    own_location: NodeLocation,
    config: Arc<EngineConfig>,
    buffer_pool: Arc<BufferPool>,
    network: Arc<NetworkManager>,
    worker_pool: Arc<WorkerPool>,
    query_manager: QueryManager,
    metrics: EngineMetrics,
    resources: DashMap<(QueryId, SubPlanId), Mutex<SubPlanResources>>,
}

impl NodeEngine {
    /// Binds `own_location.data_port` and stands up every process-wide
    /// resource sub-plans will be registered against (§4.1).
    pub async fn start(
        own_location: NodeLocation,
        config: Arc<EngineConfig>,
        registry: &Registry,
    ) -> Result<Self, NodeError> {
        info!(%own_location, "starting Tidal node engine");

        let buffer_pool = Arc::new(BufferPool::new(
            config.number_of_buffers_in_global_buffer_manager,
            config.buffer_size_in_bytes,
        ));
        let network = Arc::new(NetworkManager::bind(own_location.clone(), buffer_pool.clone()).await?);
        let worker_pool = WorkerPool::start(config.num_worker_threads, config.queueing_mode);
        let query_manager = QueryManager::new(
            worker_pool.clone(),
            Duration::from_millis(config.stop_query_timeout_ms),
        );
        let metrics = EngineMetrics::new(registry);

        Ok(Self {
            own_location,
            config,
            buffer_pool,
            network,
            worker_pool,
            query_manager,
            metrics,
            resources: DashMap::new(),
        })
    }

    pub fn own_location(&self) -> &NodeLocation {
        &self.own_location
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn subscribe_status(&self) -> tokio::sync::broadcast::Receiver<tidal_types::StatusUpdate> {
        self.query_manager.subscribe_status()
    }

    /// `registerSubPlan` (§4.3, §4.8): compiles `spec` into a
    /// `PipelineExecutor`, wires its output per `sink`, and registers both
    /// with the worker pool. `expected_origins` is the full set of upstream
    /// origins this sub-plan's sources will report EoS from, known from the
    /// compiled plan ahead of any source actually being installed.
    pub async fn register_sub_plan(
        &self,
        plan: ExecutableSubPlan,
        spec: OperatorSpec,
        sink: SinkDescriptor,
        expected_origins: Vec<OriginId>,
    ) -> Result<Arc<SubPlanHandle>, NodeError> {
        let output = self.build_output_sink(&sink).await?;
        let executor = spec::build_executor(spec, output);
        let handle = self.query_manager.register_sub_plan(plan.clone(), executor)?;

        self.resources.insert(
            plan.key(),
            Mutex::new(SubPlanResources {
                tracker: Arc::new(OriginTracker::new(expected_origins)),
                sources: Vec::new(),
            }),
        );
        self.metrics
            .sub_plans_registered
            .with_label_values(&[&plan.query_id.0.to_string()])
            .inc();
        Ok(handle)
    }

    async fn build_output_sink(&self, sink: &SinkDescriptor) -> Result<OutputSink, NodeError> {
        match sink {
            SinkDescriptor::Print => Ok(OutputSink::Records(Arc::new(tidal_io::PrintSink))),
            SinkDescriptor::NullOutput => Ok(OutputSink::Records(Arc::new(tidal_io::NullOutputSink))),
            SinkDescriptor::File { path, format, mode } => {
                let sink = tidal_io::FileSink::open(path.clone(), *format, *mode)?;
                Ok(OutputSink::Records(Arc::new(sink)))
            }
            SinkDescriptor::Network(endpoint) => {
                let producer = sources::connect_sink(&self.network, endpoint).await?;
                let emitter: Arc<dyn tidal_source::DataEmitter> = tidal_io::NetworkSink::new(producer);
                Ok(OutputSink::Network {
                    emitter,
                    buffer_pool: self.buffer_pool.clone(),
                })
            }
        }
    }

    /// Installs one of `sub_plan_id`'s upstream origins (§4.4, §4.8).
    /// `next_batch` is only consulted for a `Lambda` descriptor.
    pub fn add_source(
        &self,
        query_id: QueryId,
        sub_plan_id: SubPlanId,
        origin_id: OriginId,
        descriptor: &SourceDescriptor,
        next_batch: Option<Box<dyn FnMut() -> Option<Vec<Record>> + Send>>,
    ) -> Result<(), NodeError> {
        let entry = self
            .resources
            .get(&(query_id, sub_plan_id))
            .ok_or(tidal_engine::EngineError::UnknownSubPlan { query_id, sub_plan_id })?;
        let mut resources = entry.lock();
        let tracker = resources.tracker.clone();
        let partition_id = match descriptor {
            SourceDescriptor::Network { endpoint, .. } => Some(endpoint.partition_id),
            _ => None,
        };

        let handle = sources::install_source(
            descriptor,
            origin_id,
            sub_plan_id,
            self.worker_pool.clone(),
            tracker,
            &self.buffer_pool,
            Some(&self.network),
            next_batch,
        )?;
        resources.sources.push((handle, partition_id));
        Ok(())
    }

    /// `startQuery` for one sub-plan (§4.3): only valid once `Deployed`.
    pub fn start_sub_plan(&self, query_id: QueryId, sub_plan_id: SubPlanId) -> Result<(), NodeError> {
        self.query_manager.start_sub_plan(query_id, sub_plan_id)?;
        Ok(())
    }

    /// `stopQuery` for one sub-plan (§4.3, §5): stops every source this
    /// sub-plan owns directly, in addition to submitting the propagated
    /// stop through the worker pool, so an operator-initiated stop does not
    /// have to wait for the sub-plan's own EoS fan-in to happen on its own.
    pub fn stop_sub_plan(
        &self,
        query_id: QueryId,
        sub_plan_id: SubPlanId,
        kind: TerminationKind,
    ) -> Result<SubPlanStatus, NodeError> {
        if let Some(entry) = self.resources.get(&(query_id, sub_plan_id)) {
            for (handle, _) in &entry.lock().sources {
                handle.stop(kind);
            }
        }
        self.query_manager
            .stop_query(&[(query_id, sub_plan_id)], kind)
            .into_iter()
            .next()
            .expect("stop_query returns exactly one outcome per requested target")
            .map_err(NodeError::from)
    }

    /// `deregisterSubPlan` (§4.3, §4.8): requires a terminal status,
    /// releases every network partition this sub-plan's sources occupied.
    pub fn undeploy_sub_plan(&self, query_id: QueryId, sub_plan_id: SubPlanId) -> Result<(), NodeError> {
        if let Some((_, resources)) = self.resources.remove(&(query_id, sub_plan_id)) {
            for (_, partition_id) in resources.into_inner().sources {
                if let Some(partition_id) = partition_id {
                    self.network.unregister_subpartition_consumer(partition_id);
                }
            }
        }
        self.query_manager.deregister_sub_plan(query_id, sub_plan_id)?;
        Ok(())
    }

    pub fn stats(&self, query_id: QueryId, sub_plan_id: SubPlanId) -> Option<StatsSnapshot> {
        self.query_manager
            .handle_of(query_id, sub_plan_id)
            .map(|handle| handle.stats())
    }

    /// Tears the engine down: aborts the shuffle listener and stops every
    /// worker thread. Sub-plans still registered are not individually
    /// drained; callers that need a clean stop should `stop_sub_plan` each
    /// one first.
    pub fn shutdown(&self) {
        self.network.shutdown();
        self.worker_pool.shutdown();
    }
}
