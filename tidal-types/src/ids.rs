// Identifiers shared across the engine. Kept as small `Copy` newtypes so call
// sites read `OriginId`, `PartitionId`, etc. instead of bare integers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable identifier of a logical tuple producer. Sequence numbers and
/// watermarks are scoped per origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OriginId(pub u64);

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "origin#{}", self.0)
    }
}

/// Monotonically increasing per-origin sequence number stamped on emitted buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub fn next(self) -> Self {
        SequenceNumber(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch. Used for both event-time timestamps and
/// wall-clock buffer creation times; the two are never compared to each other.
pub type TimestampMs = u64;

/// Identifies the shared query that a sub-plan belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query#{}", self.0)
    }
}

/// Identifies a sub-plan within its shared query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubPlanId(pub u64);

impl fmt::Display for SubPlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subplan#{}", self.0)
    }
}

/// Identifies an operator within a compiled plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub u64);

/// 4-tuple address of a shuffle endpoint: `(queryId, operatorId, partitionId, subpartitionId)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId {
    pub query_id: QueryId,
    pub operator_id: OperatorId,
    pub partition_id: u32,
    pub subpartition_id: u32,
}

impl PartitionId {
    pub fn new(
        query_id: QueryId,
        operator_id: OperatorId,
        partition_id: u32,
        subpartition_id: u32,
    ) -> Self {
        Self {
            query_id,
            operator_id,
            partition_id,
            subpartition_id,
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.query_id.0, self.operator_id.0, self.partition_id, self.subpartition_id
        )
    }
}

/// Identifies a worker node. Resolved once at placement time and immutable
/// for the life of the sub-plan it addresses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLocation {
    pub node_id: u64,
    pub host: String,
    pub data_port: u16,
}

impl NodeLocation {
    pub fn new(node_id: u64, host: impl Into<String>, data_port: u16) -> Self {
        Self {
            node_id,
            host: host.into(),
            data_port,
        }
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.host, self.data_port)
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}@{}", self.node_id, self.socket_addr_string())
    }
}
