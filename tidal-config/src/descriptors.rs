use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tidal_types::{NodeLocation, PartitionId};

use crate::source::SourceConfig;

/// Network-endpoint parameters shared by network source and sink
/// descriptors: the remote partition, its peer location, and the producer
/// retry policy used by `registerSubpartitionProducer`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    pub partition_id: PartitionId,
    pub peer_location: NodeLocation,
    pub retry_interval: Duration,
    pub max_retries: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    Csv,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileWriteMode {
    Overwrite,
    Append,
}

/// Where a sub-plan's output operator writes its records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SinkDescriptor {
    File {
        path: PathBuf,
        format: FileFormat,
        mode: FileWriteMode,
    },
    Network(NetworkEndpoint),
    Print,
    NullOutput,
}

/// Where a sub-plan's input operator reads records from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SourceDescriptor {
    File {
        path: PathBuf,
        config: SourceConfig,
    },
    Csv {
        path: PathBuf,
        config: SourceConfig,
    },
    Tcp {
        config: SourceConfig,
    },
    Zmq {
        endpoint: String,
        config: SourceConfig,
    },
    Lambda {
        config: SourceConfig,
    },
    Network {
        endpoint: NetworkEndpoint,
        config: SourceConfig,
    },
}

impl SourceDescriptor {
    pub fn source_config(&self) -> &SourceConfig {
        match self {
            SourceDescriptor::File { config, .. }
            | SourceDescriptor::Csv { config, .. }
            | SourceDescriptor::Tcp { config }
            | SourceDescriptor::Zmq { config, .. }
            | SourceDescriptor::Lambda { config }
            | SourceDescriptor::Network { config, .. } => config,
        }
    }
}
