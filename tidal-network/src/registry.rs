use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use tidal_types::{NodeLocation, PartitionId, SequenceNumber, TerminationKind, TupleBuffer};

use crate::emitter::DataEmitter;
use crate::error::NetworkError;
use crate::producer::ProducerHandle;

/// Registration state of one partition as seen from this process: either
/// side (consumer or producer) may be registered, deleted, or never seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionStatus {
    Registered,
    Deleted,
    Unknown,
}

struct ConsumerEntry {
    emitter: Arc<dyn DataEmitter>,
    #[allow(dead_code)] // kept for diagnostics/logging, not read by dispatch
    sender_location: NodeLocation,
}

/// Process-wide registry mapping [`PartitionId`]s to local consumer and
/// producer state (§4.2). Never a global/static — one instance lives inside
/// each `NetworkManager`, which itself lives inside one engine instance
/// (§9 design notes).
#[derive(Default)]
pub struct PartitionManager {
    consumers: DashMap<PartitionId, ConsumerEntry>,
    deleted_consumers: DashSet<PartitionId>,
    producers: DashMap<PartitionId, Arc<ProducerHandle>>,
    deleted_producers: DashSet<PartitionId>,
}

impl PartitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_consumer(
        &self,
        partition_id: PartitionId,
        sender_location: NodeLocation,
        emitter: Arc<dyn DataEmitter>,
    ) -> Result<(), NetworkError> {
        if self.consumers.contains_key(&partition_id) {
            return Err(NetworkError::AlreadyRegistered(partition_id));
        }
        self.consumers.insert(
            partition_id,
            ConsumerEntry {
                emitter,
                sender_location,
            },
        );
        self.deleted_consumers.remove(&partition_id);
        Ok(())
    }

    pub fn unregister_consumer(&self, partition_id: PartitionId) {
        if self.consumers.remove(&partition_id).is_some() {
            self.deleted_consumers.insert(partition_id);
        }
    }

    pub fn consumer_status(&self, partition_id: PartitionId) -> PartitionStatus {
        if self.consumers.contains_key(&partition_id) {
            PartitionStatus::Registered
        } else if self.deleted_consumers.contains(&partition_id) {
            PartitionStatus::Deleted
        } else {
            PartitionStatus::Unknown
        }
    }

    /// Routes one inbound `DataBuffer` to its consumer, or reports why it
    /// couldn't be routed so the caller can reply with the matching wire
    /// error (`PartitionNotRegistered` vs `DeletedPartitionError`).
    pub fn dispatch_buffer(
        &self,
        partition_id: PartitionId,
        seq: SequenceNumber,
        buffer: TupleBuffer,
    ) -> Result<(), NetworkError> {
        match self.consumers.get(&partition_id) {
            Some(entry) => {
                entry.emitter.emit(seq, buffer);
                Ok(())
            }
            None => Err(self.not_found_error(partition_id)),
        }
    }

    pub fn dispatch_end_of_stream(
        &self,
        partition_id: PartitionId,
        termination_kind: TerminationKind,
    ) -> Result<(), NetworkError> {
        match self.consumers.get(&partition_id) {
            Some(entry) => {
                entry.emitter.end_of_stream(termination_kind);
                Ok(())
            }
            None => Err(self.not_found_error(partition_id)),
        }
    }

    fn not_found_error(&self, partition_id: PartitionId) -> NetworkError {
        if self.deleted_consumers.contains(&partition_id) {
            NetworkError::DeletedPartitionError(partition_id)
        } else {
            NetworkError::PartitionNotRegistered(partition_id)
        }
    }

    pub fn register_producer(&self, partition_id: PartitionId, handle: Arc<ProducerHandle>) {
        self.producers.insert(partition_id, handle);
        self.deleted_producers.remove(&partition_id);
    }

    pub fn producer(&self, partition_id: PartitionId) -> Option<Arc<ProducerHandle>> {
        self.producers.get(&partition_id).map(|e| e.clone())
    }

    pub fn unregister_producer(&self, partition_id: PartitionId) {
        if self.producers.remove(&partition_id).is_some() {
            self.deleted_producers.insert(partition_id);
        }
    }

    pub fn producer_status(&self, partition_id: PartitionId) -> PartitionStatus {
        if self.producers.contains_key(&partition_id) {
            PartitionStatus::Registered
        } else if self.deleted_producers.contains(&partition_id) {
            PartitionStatus::Deleted
        } else {
            PartitionStatus::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use tidal_types::OperatorId;

    use super::*;

    struct NoopEmitter;
    impl DataEmitter for NoopEmitter {
        fn emit(&self, _seq: SequenceNumber, _buffer: TupleBuffer) {}
        fn end_of_stream(&self, _termination_kind: TerminationKind) {}
    }

    fn partition(id: u32) -> PartitionId {
        PartitionId::new(tidal_types::QueryId(1), OperatorId(1), id, 0)
    }

    fn location() -> NodeLocation {
        NodeLocation::new(9, "127.0.0.1", 0)
    }

    #[test]
    fn duplicate_consumer_registration_is_rejected() {
        let manager = PartitionManager::new();
        let p = partition(1);
        manager.register_consumer(p, location(), Arc::new(NoopEmitter)).unwrap();
        let err = manager.register_consumer(p, location(), Arc::new(NoopEmitter)).unwrap_err();
        assert!(matches!(err, NetworkError::AlreadyRegistered(_)));
    }

    #[test]
    fn dispatch_to_an_unregistered_partition_reports_not_registered() {
        let manager = PartitionManager::new();
        let err = manager
            .dispatch_buffer(partition(1), SequenceNumber(0), TupleBuffer::for_test(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, NetworkError::PartitionNotRegistered(_)));
    }

    #[test]
    fn dispatch_to_a_deleted_partition_reports_deleted_not_not_registered() {
        let manager = PartitionManager::new();
        let p = partition(1);
        manager.register_consumer(p, location(), Arc::new(NoopEmitter)).unwrap();
        manager.unregister_consumer(p);

        let err = manager
            .dispatch_buffer(p, SequenceNumber(0), TupleBuffer::for_test(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, NetworkError::DeletedPartitionError(_)));
        assert_eq!(manager.consumer_status(p), PartitionStatus::Deleted);
    }

    #[test]
    fn re_registering_after_unregister_clears_the_deleted_marker() {
        let manager = PartitionManager::new();
        let p = partition(1);
        manager.register_consumer(p, location(), Arc::new(NoopEmitter)).unwrap();
        manager.unregister_consumer(p);
        manager.register_consumer(p, location(), Arc::new(NoopEmitter)).unwrap();
        assert_eq!(manager.consumer_status(p), PartitionStatus::Registered);
    }
}
