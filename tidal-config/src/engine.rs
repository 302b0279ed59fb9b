use serde::{Deserialize, Serialize};

/// How worker threads pull tasks from the task queue(s).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueingMode {
    /// One global MPMC queue shared by all worker threads.
    Global,
    /// One queue per NUMA node; threads only drain their local queue.
    PerNumaNode,
}

impl Default for QueueingMode {
    fn default() -> Self {
        QueueingMode::Global
    }
}

/// Which window-store implementation windowed operators use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowingStrategy {
    Legacy,
    Slicing,
}

impl Default for WindowingStrategy {
    fn default() -> Self {
        WindowingStrategy::Slicing
    }
}

/// Which join implementation the compiled plan should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStrategy {
    NestedLoop,
    HashJoinLocal,
}

impl Default for JoinStrategy {
    fn default() -> Self {
        JoinStrategy::HashJoinLocal
    }
}

/// Process-wide operational configuration of one `NodeEngine`.
///
/// All fields tolerate being changed between restarts without affecting
/// correctness, only resource usage and scheduling behavior. Like the
/// teacher's `Parameters`, defaults are sane enough that most callers should
/// not need to override any field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_data_port")]
    pub data_port: u16,

    #[serde(default = "EngineConfig::default_num_worker_threads")]
    pub num_worker_threads: usize,

    #[serde(default = "EngineConfig::default_buffers_in_global_pool")]
    pub number_of_buffers_in_global_buffer_manager: usize,

    #[serde(default = "EngineConfig::default_buffers_in_source_pool")]
    pub number_of_buffers_in_source_local_buffer_pool: usize,

    #[serde(default = "EngineConfig::default_buffers_per_worker")]
    pub number_of_buffers_per_worker: usize,

    #[serde(default = "EngineConfig::default_buffer_size_in_bytes")]
    pub buffer_size_in_bytes: usize,

    #[serde(default = "EngineConfig::default_source_sharing")]
    pub source_sharing: bool,

    #[serde(default)]
    pub queueing_mode: QueueingMode,

    #[serde(default)]
    pub windowing_strategy: WindowingStrategy,

    #[serde(default)]
    pub join_strategy: JoinStrategy,

    /// Upper bound `stopQuery` will wait for the thread pool's completion
    /// promise before giving up, in milliseconds. Finite and configurable
    /// rather than an unconditional 10-minute constant (§9).
    #[serde(default = "EngineConfig::default_stop_query_timeout_ms")]
    pub stop_query_timeout_ms: u64,
}

impl EngineConfig {
    pub fn default_data_port() -> u16 {
        4000
    }

    pub fn default_num_worker_threads() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn default_buffers_in_global_pool() -> usize {
        1024
    }

    pub fn default_buffers_in_source_pool() -> usize {
        64
    }

    pub fn default_buffers_per_worker() -> usize {
        128
    }

    pub fn default_buffer_size_in_bytes() -> usize {
        4096
    }

    pub fn default_source_sharing() -> bool {
        false
    }

    pub fn default_stop_query_timeout_ms() -> u64 {
        10 * 60 * 1000
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_port: Self::default_data_port(),
            num_worker_threads: Self::default_num_worker_threads(),
            number_of_buffers_in_global_buffer_manager: Self::default_buffers_in_global_pool(),
            number_of_buffers_in_source_local_buffer_pool: Self::default_buffers_in_source_pool(),
            number_of_buffers_per_worker: Self::default_buffers_per_worker(),
            buffer_size_in_bytes: Self::default_buffer_size_in_bytes(),
            source_sharing: Self::default_source_sharing(),
            queueing_mode: QueueingMode::default(),
            windowing_strategy: WindowingStrategy::default(),
            join_strategy: JoinStrategy::default(),
            stop_query_timeout_ms: Self::default_stop_query_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data_port, config.data_port);
        assert_eq!(back.num_worker_threads, config.num_worker_threads);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.data_port, EngineConfig::default_data_port());
        assert_eq!(config.join_strategy, JoinStrategy::HashJoinLocal);
    }
}
