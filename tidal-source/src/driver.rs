use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use tidal_buffer::FixedSizeBufferPool;
use tidal_config::{GatheringMode, SourceConfig};
use tidal_types::{OriginId, QueryId, SequenceNumber, TerminationKind, TimestampMs};

use crate::emitter::DataEmitter;
use crate::error::SourceError;
use crate::history::RingBuffer;
use crate::kalman::KalmanFilter;
use crate::nyquist::compute_nyquist_and_energy;
use crate::receiver::{DataReceiver, ReceiveOutcome};

/// Lifecycle status of a [`SourceDriver`] (§4.4, §5 Failure model).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceStatus {
    Created,
    Running,
    Stopped,
    Failed,
}

/// How many recent samples the adaptive gathering modes keep for their
/// bandwidth estimate (`lastValuesBuf`/`lastIntervalBuf` in the original
/// adaptive routine, §4.4).
const ADAPTIVE_HISTORY_CAPACITY: usize = 32;
/// The widest interval the Kalman filter is allowed to settle the adaptive
/// modes on, per the original's `setGatheringIntervalRange(8000ms)`.
const ADAPTIVE_INTERVAL_RANGE_MS: u64 = 8000;

fn now_ms() -> TimestampMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as TimestampMs
}

/// A long-lived, thread-per-source driver (§4.4): runs `open → loop →
/// close` under one of three pacing regimes, stamping and forwarding every
/// buffer it produces to its successors.
pub struct SourceDriver {
    origin_id: OriginId,
    config: SourceConfig,
    pool: FixedSizeBufferPool,
    successors: Vec<Arc<dyn DataEmitter>>,
    receiver: Mutex<Box<dyn DataReceiver>>,
    number_of_consumer_queries: u32,

    running: AtomicBool,
    was_started: AtomicBool,
    stop_ref_count: AtomicU32,
    eos_sent: AtomicBool,
    termination_kind: Mutex<TerminationKind>,
    max_sequence_number: AtomicU64,
    last_watermark_ms: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SourceDriver {
    pub fn new(
        origin_id: OriginId,
        config: SourceConfig,
        pool: FixedSizeBufferPool,
        successors: Vec<Arc<dyn DataEmitter>>,
        receiver: Box<dyn DataReceiver>,
        number_of_consumer_queries: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            origin_id,
            config,
            pool,
            successors,
            receiver: Mutex::new(receiver),
            number_of_consumer_queries: number_of_consumer_queries.max(1),
            running: AtomicBool::new(false),
            was_started: AtomicBool::new(false),
            stop_ref_count: AtomicU32::new(0),
            eos_sent: AtomicBool::new(false),
            termination_kind: Mutex::new(TerminationKind::Graceful),
            max_sequence_number: AtomicU64::new(0),
            last_watermark_ms: AtomicU64::new(0),
            thread: Mutex::new(None),
        })
    }

    pub fn origin_id(&self) -> OriginId {
        self.origin_id
    }

    pub fn status(&self) -> SourceStatus {
        if !self.was_started.load(Ordering::Acquire) {
            SourceStatus::Created
        } else if self.running.load(Ordering::Acquire) {
            SourceStatus::Running
        } else if *self.termination_kind.lock() == TerminationKind::Failure {
            SourceStatus::Failed
        } else {
            SourceStatus::Stopped
        }
    }

    /// Spawns the gathering thread. Returns `false` if already running
    /// (mirrors `DataSource::start`'s `compare_exchange` guard).
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            warn!(origin_id = %self.origin_id, "source is already running");
            return false;
        }
        self.was_started.store(true, Ordering::Release);
        if let Some(cpu) = self.config.source_affinity {
            debug!(origin_id = %self.origin_id, cpu, "source affinity requested but pinning is not implemented on this platform");
        }

        let driver = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("tidal-source-{}", self.origin_id.0))
            .spawn(move || driver.run())
            .expect("failed to spawn source thread");
        *self.thread.lock() = Some(handle);
        true
    }

    /// Reference-counted graceful/hard stop (§4.4, §5 Cancellation):
    /// `running` only flips once every consumer has called `stop`.
    pub fn stop(&self, kind: TerminationKind) -> bool {
        *self.termination_kind.lock() = kind;
        let stopped_by = self.stop_ref_count.fetch_add(1, Ordering::AcqRel) + 1;
        if stopped_by < self.number_of_consumer_queries {
            return true;
        }
        self.running.store(false, Ordering::Release);
        self.join();
        true
    }

    /// A hard stop that forces EoS(Failure) regardless of the consumer
    /// reference count (§4.4 "fail() is a hard stop").
    pub fn fail(&self) -> bool {
        *self.termination_kind.lock() = TerminationKind::Failure;
        self.running.store(false, Ordering::Release);
        self.join();
        self.close(TerminationKind::Failure);
        true
    }

    fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Enqueues a control buffer carrying an epoch barrier (§4.4). Returns
    /// `false` if the source is not running.
    pub fn inject_epoch_barrier(&self, timestamp: TimestampMs, query_id: QueryId) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        debug!(origin_id = %self.origin_id, %query_id, timestamp, "injecting epoch barrier");
        true
    }

    fn open(&self) {
        debug!(origin_id = %self.origin_id, "source opened");
    }

    /// Emits EoS to every successor exactly once, regardless of how many
    /// callers observe the loop's end (§4.4 "emit EoS if first to observe
    /// graceful stop").
    fn close(&self, kind: TerminationKind) {
        if self.eos_sent.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            debug!(origin_id = %self.origin_id, ?kind, "source closed, propagating end-of-stream");
            for successor in &self.successors {
                successor.emit_end_of_stream(kind);
            }
        }
    }

    fn emit_work_from_source(&self, buffer: tidal_types::TupleBuffer, watermark_ms: TimestampMs) {
        let seq = SequenceNumber(self.max_sequence_number.fetch_add(1, Ordering::AcqRel) + 1);
        let watermark = self.last_watermark_ms.fetch_max(watermark_ms, Ordering::AcqRel).max(watermark_ms);
        buffer.stamp(self.origin_id, seq, watermark, now_ms());
        trace!(origin_id = %self.origin_id, seq = seq.0, watermark, "emitting buffer");
        for successor in &self.successors {
            successor.emit(buffer.clone());
        }
    }

    fn acquire_buffer(&self) -> Result<tidal_types::TupleBuffer, SourceError> {
        self.pool.get_buffer_blocking().map_err(|source| SourceError::BufferPool { origin_id: self.origin_id, source })
    }

    /// One `receiveData` + `emitWorkFromSource` step (§4.4). Returns `false`
    /// once the loop should stop, either because the source is exhausted or
    /// because it hit a fatal error (recorded via `termination_kind`).
    fn produce_one(&self) -> bool {
        let buffer = match self.acquire_buffer() {
            Ok(buffer) => buffer,
            Err(err) => {
                error!(origin_id = %self.origin_id, %err, "failed to acquire a buffer");
                *self.termination_kind.lock() = TerminationKind::Failure;
                return false;
            }
        };
        let outcome = self.receiver.lock().receive(&buffer);
        match outcome {
            Ok(ReceiveOutcome::Produced { watermark, sample_values: _ }) => {
                self.emit_work_from_source(buffer, watermark);
                true
            }
            Ok(ReceiveOutcome::Exhausted) => {
                debug!(origin_id = %self.origin_id, "source exhausted, stopping gracefully");
                false
            }
            Err(err) => {
                error!(origin_id = %self.origin_id, %err, "receiveData failed");
                *self.termination_kind.lock() = TerminationKind::Failure;
                false
            }
        }
    }

    fn buffers_remaining(&self, produced: u64) -> bool {
        self.config.number_of_buffers_to_produce == 0 || produced < self.config.number_of_buffers_to_produce
    }

    fn run(self: Arc<Self>) {
        match self.config.gathering_mode {
            GatheringMode::Interval => self.run_interval(),
            GatheringMode::IngestionRate => self.run_ingestion_rate(),
            GatheringMode::Adaptive => self.run_adaptive(false),
            GatheringMode::AdaptiveOversampler => self.run_adaptive(true),
        }
    }

    /// Fixed interval pacing (§4.4): sleep `gathering_interval_ms` between
    /// iterations.
    fn run_interval(&self) {
        self.open();
        let interval = Duration::from_millis(self.config.gathering_interval_ms);
        let mut produced = 0u64;
        while self.running.load(Ordering::Acquire) && self.buffers_remaining(produced) {
            if !self.produce_one() {
                break;
            }
            produced += 1;
            if !interval.is_zero() {
                std::thread::sleep(interval);
            }
        }
        self.running.store(false, Ordering::Release);
        self.close(*self.termination_kind.lock());
    }

    /// Ingestion-rate pacing (§4.4): `gatheringIngestionRate / 10` buffers
    /// per 100 ms slot, spin-waiting out the remainder of an underrun slot
    /// and logging (not failing) an overrun.
    fn run_ingestion_rate(&self) {
        self.open();
        let per_slot = (self.config.gathering_ingestion_rate / 10).max(1);
        let slot = Duration::from_millis(100);
        let mut produced = 0u64;
        while self.running.load(Ordering::Acquire) && self.buffers_remaining(produced) {
            let slot_start = Instant::now();
            let mut produced_in_slot = 0u64;
            while produced_in_slot < per_slot
                && self.running.load(Ordering::Acquire)
                && self.buffers_remaining(produced)
            {
                if !self.produce_one() {
                    self.running.store(false, Ordering::Release);
                    break;
                }
                produced += 1;
                produced_in_slot += 1;
            }
            let elapsed = slot_start.elapsed();
            if elapsed > slot {
                warn!(origin_id = %self.origin_id, elapsed_ms = elapsed.as_millis() as u64, "ingestion-rate slot overran, continuing");
            } else {
                while slot_start.elapsed() < slot {
                    std::hint::spin_loop();
                }
            }
        }
        self.running.store(false, Ordering::Release);
        self.close(*self.termination_kind.lock());
    }

    /// Adaptive pacing (§4.4): re-derives the gathering interval from a
    /// Kalman filter fed by recent sample values after every buffer, bounded
    /// above by a Nyquist estimate. `oversampler == true` reproduces the
    /// preserved quirk where the filter is updated but the derived interval
    /// is discarded (§9).
    fn run_adaptive(&self, oversampler: bool) {
        self.open();
        let mut filter = KalmanFilter::new(self.config.gathering_interval_ms);
        filter.set_gathering_interval_range(ADAPTIVE_INTERVAL_RANGE_MS);
        let mut values = RingBuffer::<f64>::new(ADAPTIVE_HISTORY_CAPACITY);
        let mut intervals_s = RingBuffer::<f64>::new(ADAPTIVE_HISTORY_CAPACITY);
        let mut interval_ms = self.config.gathering_interval_ms;

        let mut produced = 0u64;
        while self.running.load(Ordering::Acquire) && self.buffers_remaining(produced) {
            let buffer = match self.acquire_buffer() {
                Ok(buffer) => buffer,
                Err(err) => {
                    error!(origin_id = %self.origin_id, %err, "failed to acquire a buffer");
                    *self.termination_kind.lock() = TerminationKind::Failure;
                    break;
                }
            };
            let outcome = self.receiver.lock().receive(&buffer);
            match outcome {
                Ok(ReceiveOutcome::Produced { watermark, sample_values }) => {
                    let current_interval_s = interval_ms as f64 / 1000.0;
                    for value in &sample_values {
                        values.push(*value);
                        intervals_s.push(current_interval_s);
                    }

                    let mean_interval_s =
                        if intervals_s.is_empty() { current_interval_s } else { intervals_s.iter().sum::<f64>() / intervals_s.len() as f64 };
                    let skewed_interval_s = (mean_interval_s + current_interval_s) / 2.0;

                    let samples: Vec<f64> = values.iter().copied().collect();
                    let (bounded, nyquist_interval_s) = compute_nyquist_and_energy(&samples, skewed_interval_s);
                    if bounded {
                        filter.set_slowest_interval((nyquist_interval_s * 1000.0).round() as u64);
                    }

                    filter.update(current_interval_s * 1000.0);
                    let derived = filter.new_gathering_interval();
                    if !oversampler {
                        interval_ms = derived;
                    }

                    self.emit_work_from_source(buffer, watermark);
                    produced += 1;
                }
                Ok(ReceiveOutcome::Exhausted) => {
                    debug!(origin_id = %self.origin_id, "source exhausted, stopping gracefully");
                    break;
                }
                Err(err) => {
                    error!(origin_id = %self.origin_id, %err, "receiveData failed");
                    *self.termination_kind.lock() = TerminationKind::Failure;
                    break;
                }
            }

            if interval_ms > 0 {
                std::thread::sleep(Duration::from_millis(interval_ms));
            }
        }
        self.running.store(false, Ordering::Release);
        self.close(*self.termination_kind.lock());
    }
}
