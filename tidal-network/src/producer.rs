use std::cmp::min;
use std::collections::VecDeque;
use std::time::Duration;

use futures::SinkExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::codec::Framed;
use tracing::{error, warn};

use tidal_types::{NodeLocation, PartitionId, SequenceNumber, TerminationKind, TupleBuffer};

use crate::codec::WireCodec;
use crate::error::NetworkError;
use crate::framing;
use crate::messages::WireMessage;

const SEND_QUEUE_DEPTH: usize = 256;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

enum Outbound {
    Data(SequenceNumber, TupleBuffer),
    Eos(TerminationKind),
    Control(Control),
}

enum Control {
    StartBuffering,
    StopBuffering,
    Reconnect(NodeLocation),
}

/// The producer side of one partition's shuffle channel: owns the outbound
/// TCP connection and a background task that drains a bounded queue of
/// buffers/events onto it (§4.2).
///
/// `write_data`/`write_end_of_stream` block the calling (worker) thread when
/// the internal queue is full, which is how backpressure from a slow or
/// disconnected transport propagates back to `writeData`'s caller.
pub struct ProducerHandle {
    partition_id: PartitionId,
    tx: mpsc::Sender<Outbound>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProducerHandle {
    /// Establishes the channel, retrying the initial connection per
    /// `retryInterval`/`maxRetries`. Returns `Err(RetriesExhausted)` once
    /// retries are exhausted, per §4.2.
    pub async fn connect(
        partition_id: PartitionId,
        peer_location: NodeLocation,
        retry_interval: Duration,
        max_retries: u32,
    ) -> Result<std::sync::Arc<Self>, NetworkError> {
        let stream =
            connect_with_backoff(partition_id, &peer_location, retry_interval, max_retries)
                .await?;
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let task = tokio::spawn(run(
            partition_id,
            stream,
            rx,
            peer_location,
            retry_interval,
            max_retries,
        ));
        Ok(std::sync::Arc::new(Self {
            partition_id,
            tx,
            task: Mutex::new(Some(task)),
        }))
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Blocks the calling thread if the send queue is full. Intended for use
    /// from a worker OS thread, mirroring `get_buffer_blocking`.
    pub fn write_data(&self, seq: SequenceNumber, buffer: TupleBuffer) -> Result<(), NetworkError> {
        self.tx
            .blocking_send(Outbound::Data(seq, buffer))
            .map_err(|_| channel_closed(self.partition_id))
    }

    pub fn write_end_of_stream(&self, termination_kind: TerminationKind) -> Result<(), NetworkError> {
        self.tx
            .blocking_send(Outbound::Eos(termination_kind))
            .map_err(|_| channel_closed(self.partition_id))
    }

    pub fn start_buffering(&self) -> Result<(), NetworkError> {
        self.tx
            .blocking_send(Outbound::Control(Control::StartBuffering))
            .map_err(|_| channel_closed(self.partition_id))
    }

    pub fn stop_buffering(&self) -> Result<(), NetworkError> {
        self.tx
            .blocking_send(Outbound::Control(Control::StopBuffering))
            .map_err(|_| channel_closed(self.partition_id))
    }

    /// Requests that the background task reconnect to `new_peer`, flushing
    /// any buffered content to it once connected.
    pub fn reconfigure_peer(&self, new_peer: NodeLocation) -> Result<(), NetworkError> {
        self.tx
            .blocking_send(Outbound::Control(Control::Reconnect(new_peer)))
            .map_err(|_| channel_closed(self.partition_id))
    }

    /// Tears the channel down without waiting for the background task to
    /// notice; mirrors `Broadcaster::stop`'s "don't wait, speed up shutdown".
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

fn channel_closed(partition_id: PartitionId) -> NetworkError {
    NetworkError::Transport {
        partition: partition_id,
        source: std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "producer background task has exited",
        ),
    }
}

async fn connect_with_backoff(
    partition_id: PartitionId,
    peer: &NodeLocation,
    retry_interval: Duration,
    max_retries: u32,
) -> Result<TcpStream, NetworkError> {
    let mut attempt = 0u32;
    let mut delay = retry_interval;
    loop {
        match TcpStream::connect(peer.socket_addr_string()).await {
            Ok(stream) => return Ok(stream),
            Err(source) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(NetworkError::RetriesExhausted {
                        partition: partition_id,
                        peer: peer.to_string(),
                        retries: max_retries,
                    });
                }
                warn!(
                    partition = %partition_id,
                    peer = %peer,
                    attempt,
                    error = %source,
                    "producer connect failed, retrying"
                );
                sleep(delay).await;
                delay = min(delay * 2, MAX_BACKOFF);
            }
        }
    }
}

/// Background task owning the connection; see module docs for the
/// buffering/reconnect state machine.
async fn run(
    partition_id: PartitionId,
    stream: TcpStream,
    mut rx: mpsc::Receiver<Outbound>,
    mut peer: NodeLocation,
    retry_interval: Duration,
    max_retries: u32,
) {
    let mut framed = Framed::new(stream, WireCodec::default());
    if let Err(err) = framed.send(WireMessage::AnnouncePartition { partition_id }).await {
        error!(partition = %partition_id, %err, "failed to announce partition, abandoning channel");
        return;
    }

    let mut buffering = false;
    let mut queue: VecDeque<WireMessage> = VecDeque::new();

    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Data(seq, buffer) => {
                let payload = framing::encode(&buffer);
                let msg = WireMessage::DataBuffer {
                    partition_id,
                    seq,
                    payload,
                };
                if buffering {
                    queue.push_back(msg);
                } else if let Err(err) = framed.send(msg).await {
                    warn!(partition = %partition_id, %err, "send failed, buffer dropped from live path");
                }
            }
            Outbound::Eos(termination_kind) => {
                let msg = WireMessage::EndOfStream {
                    partition_id,
                    termination_kind,
                };
                if buffering {
                    queue.push_back(msg);
                } else if let Err(err) = framed.send(msg).await {
                    warn!(partition = %partition_id, %err, "end-of-stream send failed");
                }
            }
            Outbound::Control(Control::StartBuffering) => {
                buffering = true;
            }
            Outbound::Control(Control::StopBuffering) => {
                buffering = false;
                while let Some(msg) = queue.pop_front() {
                    if let Err(err) = framed.send(msg).await {
                        warn!(partition = %partition_id, %err, "flush after StopBuffering failed");
                        break;
                    }
                }
            }
            Outbound::Control(Control::Reconnect(new_peer)) => {
                peer = new_peer;
                match connect_with_backoff(partition_id, &peer, retry_interval, max_retries).await
                {
                    Ok(stream) => {
                        framed = Framed::new(stream, WireCodec::default());
                        let _ = framed
                            .send(WireMessage::AnnouncePartition { partition_id })
                            .await;
                    }
                    Err(err) => {
                        error!(partition = %partition_id, %err, "reconnect exhausted retries, abandoning channel");
                        return;
                    }
                }
            }
        }
    }
}

