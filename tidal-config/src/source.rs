use serde::{Deserialize, Serialize};

/// The physical source implementation behind a source operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Default,
    Csv,
    Tcp,
    Zmq,
    Lambda,
}

/// Which of the three scheduling regimes (§4.4) a source runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatheringMode {
    Interval,
    IngestionRate,
    Adaptive,
    AdaptiveOversampler,
}

impl Default for GatheringMode {
    fn default() -> Self {
        GatheringMode::Interval
    }
}

/// How a TCP source delimits tuples within its byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framing {
    Separator,
    LengthFromSocket { length_bytes: u8 },
    Fixed { tuple_size_bytes: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFormat {
    Csv,
    Json,
}

/// TCP-specific knobs, only meaningful when `SourceConfig::source_type`
/// is [`SourceType::Tcp`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TcpSourceOptions {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
    pub input_format: InputFormat,
    pub tuple_separator: char,
}

impl Default for TcpSourceOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            framing: Framing::Separator,
            input_format: InputFormat::Csv,
            tuple_separator: '\n',
        }
    }
}

/// Per-physical-source configuration (§6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "SourceConfig::default_source_type")]
    pub source_type: SourceType,

    #[serde(default)]
    pub gathering_mode: GatheringMode,

    #[serde(default = "SourceConfig::default_gathering_interval_ms")]
    pub gathering_interval_ms: u64,

    /// Target buffers/sec; only validated (must be >= 10) when
    /// `gathering_mode == IngestionRate`.
    #[serde(default = "SourceConfig::default_gathering_ingestion_rate")]
    pub gathering_ingestion_rate: u64,

    /// 0 means unbounded.
    #[serde(default)]
    pub number_of_buffers_to_produce: u64,

    #[serde(default = "SourceConfig::default_number_of_tuples_per_buffer")]
    pub number_of_tuples_per_buffer: u32,

    #[serde(default)]
    pub tcp: Option<TcpSourceOptions>,

    /// Pin the source thread to this CPU, if set.
    #[serde(default)]
    pub source_affinity: Option<usize>,
}

impl SourceConfig {
    pub fn default_source_type() -> SourceType {
        SourceType::Default
    }

    pub fn default_gathering_interval_ms() -> u64 {
        1000
    }

    pub fn default_gathering_ingestion_rate() -> u64 {
        10
    }

    pub fn default_number_of_tuples_per_buffer() -> u32 {
        1
    }

    /// Validates the constraint from §6: `gatheringIngestionRate >= 10` when
    /// `gatheringMode == IngestionRate`.
    pub fn validate(&self) -> Result<(), String> {
        if self.gathering_mode == GatheringMode::IngestionRate && self.gathering_ingestion_rate < 10
        {
            return Err(format!(
                "gathering_ingestion_rate must be >= 10 in IngestionRate mode, got {}",
                self.gathering_ingestion_rate
            ));
        }
        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_type: Self::default_source_type(),
            gathering_mode: GatheringMode::default(),
            gathering_interval_ms: Self::default_gathering_interval_ms(),
            gathering_ingestion_rate: Self::default_gathering_ingestion_rate(),
            number_of_buffers_to_produce: 0,
            number_of_tuples_per_buffer: Self::default_number_of_tuples_per_buffer(),
            tcp: None,
            source_affinity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_rate_below_floor_is_rejected() {
        let config = SourceConfig {
            gathering_mode: GatheringMode::IngestionRate,
            gathering_ingestion_rate: 9,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn interval_mode_ignores_ingestion_rate_floor() {
        let config = SourceConfig {
            gathering_mode: GatheringMode::Interval,
            gathering_ingestion_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
