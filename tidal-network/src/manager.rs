use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};

use tidal_buffer::BufferPool;
use tidal_types::{NodeLocation, PartitionId, TupleBuffer};

use crate::codec::WireCodec;
use crate::emitter::DataEmitter;
use crate::error::NetworkError;
use crate::framing;
use crate::messages::WireMessage;
use crate::producer::ProducerHandle;
use crate::registry::{PartitionManager, PartitionStatus};

/// Owns the inbound server socket and every outbound channel for one engine
/// instance (§4.2). Never a global/static: one `NetworkManager` per
/// `NodeEngine`.
pub struct NetworkManager {
    own_location: NodeLocation,
    partitions: Arc<PartitionManager>,
    buffer_pool: Arc<BufferPool>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkManager {
    /// Binds `own_location.data_port` and starts accepting inbound shuffle
    /// connections in the background.
    pub async fn bind(
        own_location: NodeLocation,
        buffer_pool: Arc<BufferPool>,
    ) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(("0.0.0.0", own_location.data_port))
            .await
            .map_err(NetworkError::Io)?;
        let partitions = Arc::new(PartitionManager::new());
        let task = tokio::spawn(accept_loop(
            listener,
            partitions.clone(),
            buffer_pool.clone(),
        ));
        Ok(Self {
            own_location,
            partitions,
            buffer_pool,
            listener_task: Mutex::new(Some(task)),
        })
    }

    pub fn own_location(&self) -> &NodeLocation {
        &self.own_location
    }

    pub fn partitions(&self) -> &Arc<PartitionManager> {
        &self.partitions
    }

    pub fn register_subpartition_consumer(
        &self,
        partition_id: PartitionId,
        sender_location: NodeLocation,
        emitter: Arc<dyn DataEmitter>,
    ) -> Result<(), NetworkError> {
        self.partitions
            .register_consumer(partition_id, sender_location, emitter)
    }

    pub fn unregister_subpartition_consumer(&self, partition_id: PartitionId) {
        self.partitions.unregister_consumer(partition_id);
    }

    /// Connects to `receiver_location` with the given retry policy and
    /// registers the resulting channel as this partition's producer.
    pub async fn register_subpartition_producer(
        &self,
        partition_id: PartitionId,
        receiver_location: NodeLocation,
        retry_interval: Duration,
        max_retries: u32,
    ) -> Result<Arc<ProducerHandle>, NetworkError> {
        let handle =
            ProducerHandle::connect(partition_id, receiver_location, retry_interval, max_retries)
                .await?;
        self.partitions.register_producer(partition_id, handle.clone());
        Ok(handle)
    }

    pub fn unregister_subpartition_producer(&self, partition_id: PartitionId) {
        if let Some(handle) = self.partitions.producer(partition_id) {
            handle.stop();
        }
        self.partitions.unregister_producer(partition_id);
    }

    pub fn producer(&self, partition_id: PartitionId) -> Option<Arc<ProducerHandle>> {
        self.partitions.producer(partition_id)
    }

    pub fn consumer_status(&self, partition_id: PartitionId) -> PartitionStatus {
        self.partitions.consumer_status(partition_id)
    }

    pub fn producer_status(&self, partition_id: PartitionId) -> PartitionStatus {
        self.partitions.producer_status(partition_id)
    }

    pub fn shutdown(&self) {
        if let Some(task) = self.listener_task.lock().take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    partitions: Arc<PartitionManager>,
    buffer_pool: Arc<BufferPool>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(%addr, "accepted inbound shuffle connection");
                tokio::spawn(handle_connection(
                    stream,
                    partitions.clone(),
                    buffer_pool.clone(),
                ));
            }
            Err(err) => {
                error!(%err, "shuffle listener accept failed, stopping accept loop");
                return;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    partitions: Arc<PartitionManager>,
    buffer_pool: Arc<BufferPool>,
) {
    let mut framed = Framed::new(stream, WireCodec::default());
    while let Some(frame) = framed.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "shuffle connection read error, closing");
                return;
            }
        };

        match message {
            WireMessage::AnnouncePartition { partition_id } => {
                debug!(%partition_id, "peer announced partition");
            }
            WireMessage::DataBuffer {
                partition_id,
                seq,
                payload,
            } => {
                let buffer: TupleBuffer = match framing::decode(&payload, partition_id, &buffer_pool) {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        warn!(%partition_id, %err, "failed to decode inbound DataBuffer");
                        continue;
                    }
                };
                if let Err(err) = partitions.dispatch_buffer(partition_id, seq, buffer) {
                    warn!(%partition_id, %err, "could not dispatch inbound buffer");
                }
            }
            WireMessage::EndOfStream {
                partition_id,
                termination_kind,
            } => {
                if let Err(err) = partitions.dispatch_end_of_stream(partition_id, termination_kind) {
                    warn!(%partition_id, %err, "could not dispatch end-of-stream");
                }
            }
            WireMessage::Event { partition_id, kind } => {
                // Reserved for future backward-flow signaling from a
                // consumer to its producer over the same connection;
                // reconfiguration in this engine is driven locally through
                // `ProducerHandle`, so inbound events are only logged.
                debug!(%partition_id, ?kind, "received event on shuffle connection");
            }
            WireMessage::Error { kind, channel_id } => {
                warn!(?kind, channel_id, "peer reported wire-level error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{TcpListener as StdTcpListener, TcpStream as StdTcpStream};

    use parking_lot::Mutex as StdMutex;
    use tidal_types::{OperatorId, PartitionId, QueryId, SequenceNumber, TerminationKind};

    use super::*;

    /// Binds an ephemeral port and immediately connects-and-drops, so the OS
    /// holds it in `TIME_WAIT` long enough for the caller to reuse it
    /// deterministically.
    fn test_port() -> u16 {
        const MAX_RETRIES: u32 = 1000;
        for _ in 0..MAX_RETRIES {
            if let Ok(port) = try_ephemeral_port() {
                return port;
            }
        }
        panic!("could not find an available local port after {MAX_RETRIES} retries");
    }

    fn try_ephemeral_port() -> std::io::Result<u16> {
        let listener = StdTcpListener::bind(("127.0.0.1", 0))?;
        let addr = listener.local_addr()?;
        let _sender = StdTcpStream::connect(addr)?;
        let _incoming = listener.accept()?;
        Ok(addr.port())
    }

    #[derive(Default)]
    struct CollectingEmitter {
        sequences: StdMutex<Vec<u64>>,
        eos: StdMutex<Option<TerminationKind>>,
    }

    impl CollectingEmitter {
        fn count(&self) -> usize {
            self.sequences.lock().len()
        }
    }

    impl DataEmitter for CollectingEmitter {
        fn emit(&self, seq: SequenceNumber, _buffer: TupleBuffer) {
            self.sequences.lock().push(seq.0);
        }

        fn end_of_stream(&self, termination_kind: TerminationKind) {
            *self.eos.lock() = Some(termination_kind);
        }
    }

    fn data_buffer() -> TupleBuffer {
        let buffer = TupleBuffer::for_test(vec![0u8; 8]);
        buffer.set_tuple_count(1);
        buffer
    }

    /// §8 scenario 6: a producer emits 400 buffers; midway it is asked to
    /// buffer, then to resume. The consumer ends up with exactly 400
    /// buffers, delivered in the order they were produced, with no
    /// duplicates — the buffering interval here is scaled down from the
    /// nominal 1s to keep this test fast.
    #[tokio::test]
    async fn buffering_then_resuming_loses_nothing_and_preserves_order() {
        let consumer_location = NodeLocation::new(1, "127.0.0.1", test_port());
        let producer_location = NodeLocation::new(2, "127.0.0.1", test_port());

        let buffer_pool = Arc::new(BufferPool::new(16, 256));
        let consumer_net = NetworkManager::bind(consumer_location.clone(), buffer_pool.clone())
            .await
            .unwrap();
        let producer_net = NetworkManager::bind(producer_location, buffer_pool.clone())
            .await
            .unwrap();

        let partition_id = PartitionId::new(QueryId(1), OperatorId(1), 0, 0);
        let emitter = Arc::new(CollectingEmitter::default());
        consumer_net
            .register_subpartition_consumer(partition_id, consumer_location.clone(), emitter.clone())
            .unwrap();

        let producer = producer_net
            .register_subpartition_producer(
                partition_id,
                consumer_location,
                std::time::Duration::from_millis(50),
                5,
            )
            .await
            .unwrap();

        tokio::task::spawn_blocking(move || {
            for i in 0..200u64 {
                producer.write_data(SequenceNumber(i), data_buffer()).unwrap();
            }
            producer.start_buffering().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(100));
            producer.stop_buffering().unwrap();
            for i in 200..400u64 {
                producer.write_data(SequenceNumber(i), data_buffer()).unwrap();
            }
        })
        .await
        .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while emitter.count() < 400 && std::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let sequences = emitter.sequences.lock().clone();
        assert_eq!(sequences.len(), 400, "consumer must end up with exactly the 400 buffers sent");
        assert_eq!(sequences, (0u64..400).collect::<Vec<_>>(), "no reordering and no duplicates across the buffering interval");

        consumer_net.shutdown();
        producer_net.shutdown();
    }
}
