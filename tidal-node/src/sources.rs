// Wires a sub-plan's `SourceDescriptor` to its `SourceInlet` (§4.4, §4.8,
// §6). Only `Lambda` and `Network` are implemented: parsing a byte stream
// into records (CSV/JSON/TCP framing) is an explicit non-goal (§1), so the
// descriptors that would require it report a clear, typed error instead of
// a silent stub.

use std::sync::Arc;

use tidal_buffer::{BufferPool, FixedSizeBufferPool};
use tidal_config::SourceDescriptor;
use tidal_engine::WorkerPool;
use tidal_io::LambdaSource;
use tidal_network::NetworkManager;
use tidal_source::SourceDriver;
use tidal_types::{NodeLocation, OriginId, Record, SubPlanId};

use crate::error::NodeError;
use crate::inlet::SourceInlet;
use crate::origin_tracker::OriginTracker;

/// A running source this sub-plan owns, kept alive for the life of the
/// pipeline. `Lambda` holds the driver thread handle so it can be stopped;
/// `Network` has nothing further to own, the registration itself lives in
/// the `NetworkManager`'s partition table until explicitly unregistered.
pub enum SourceHandle {
    Lambda(Arc<SourceDriver>),
    Network,
}

impl SourceHandle {
    pub fn stop(&self, kind: tidal_types::TerminationKind) {
        if let SourceHandle::Lambda(driver) = self {
            driver.stop(kind);
        }
    }
}

/// Installs `descriptor` as one of `sub_plan_id`'s upstream origins,
/// registering a [`SourceInlet`] so its buffers and EoS reports reach
/// `worker_pool` as tasks, fanned in through `tracker`.
///
/// `next_batch` supplies the closure a `Lambda` descriptor polls for its
/// next batch of records; it is ignored for every other descriptor variant.
pub fn install_source(
    descriptor: &SourceDescriptor,
    origin_id: OriginId,
    sub_plan_id: SubPlanId,
    worker_pool: Arc<WorkerPool>,
    tracker: Arc<OriginTracker>,
    buffer_pool: &BufferPool,
    network: Option<&NetworkManager>,
    next_batch: Option<Box<dyn FnMut() -> Option<Vec<Record>> + Send>>,
) -> Result<SourceHandle, NodeError> {
    match descriptor {
        SourceDescriptor::Lambda { config } => {
            let next_batch = next_batch.ok_or_else(|| NodeError::UnsupportedDescriptor {
                descriptor: "Lambda source with no batch function supplied",
            })?;
            let source_pool: FixedSizeBufferPool =
                buffer_pool.create_fixed_size_buffer_pool(config.number_of_tuples_per_buffer.max(1) as usize);
            let inlet = SourceInlet::new(origin_id, sub_plan_id, worker_pool, tracker);
            let successors: Vec<Arc<dyn tidal_source::DataEmitter>> = vec![inlet];
            let receiver = Box::new(LambdaSource::new(origin_id, next_batch));
            let driver = SourceDriver::new(
                origin_id,
                config.clone(),
                source_pool,
                successors,
                receiver,
                1,
            );
            driver.start();
            Ok(SourceHandle::Lambda(driver))
        }
        SourceDescriptor::Network { endpoint, .. } => {
            let network = network.ok_or_else(|| NodeError::UnsupportedDescriptor {
                descriptor: "Network source with no NetworkManager bound",
            })?;
            let inlet: Arc<dyn tidal_network::DataEmitter> =
                SourceInlet::new(origin_id, sub_plan_id, worker_pool, tracker);
            // The sender's own address is only used by the peer to label
            // its outbound connection attempt; for a registered consumer it
            // is informational, so a loopback placeholder on the remote's
            // own port is sufficient.
            let sender_location = NodeLocation::new(0, "0.0.0.0", endpoint.peer_location.data_port);
            network.register_subpartition_consumer(endpoint.partition_id, sender_location, inlet)?;
            Ok(SourceHandle::Network)
        }
        SourceDescriptor::File { .. } => Err(NodeError::UnsupportedDescriptor { descriptor: "File" }),
        SourceDescriptor::Csv { .. } => Err(NodeError::UnsupportedDescriptor { descriptor: "Csv" }),
        SourceDescriptor::Tcp { .. } => Err(NodeError::UnsupportedDescriptor { descriptor: "Tcp" }),
        SourceDescriptor::Zmq { .. } => Err(NodeError::UnsupportedDescriptor { descriptor: "Zmq" }),
    }
}

/// Connects to `endpoint` and installs the resulting producer as the sink
/// for `sub_plan_id`'s output (§4.2, §6 `SinkDescriptor::Network`).
pub async fn connect_sink(
    network: &NetworkManager,
    endpoint: &tidal_config::NetworkEndpoint,
) -> Result<Arc<tidal_network::ProducerHandle>, NodeError> {
    let handle = network
        .register_subpartition_producer(
            endpoint.partition_id,
            endpoint.peer_location.clone(),
            endpoint.retry_interval,
            endpoint.max_retries,
        )
        .await?;
    Ok(handle)
}
