// Handler helper functions
//
// Topic and partition resolution shared by the per-partition handlers, and
// the conversions between kafka-protocol name types and plain strings.

use std::sync::Arc;

use kafka_protocol::messages::TopicName;
use kafka_protocol::protocol::StrBytes;

use crate::kafka::storage::{Partition, Topic};
use crate::kafka::store::Store;

/// Result of resolving a topic/partition pair
pub enum PartitionResolution {
    Found(Arc<Topic>, Arc<Partition>),
    /// Topic unknown, or partition index out of range
    NotFound,
}

/// Resolve `topic`/`partition` against the store
pub fn resolve_partition(store: &Store, topic: &str, partition: i32) -> PartitionResolution {
    let Some(found) = store.topic(topic) else {
        return PartitionResolution::NotFound;
    };
    match found.partition(partition) {
        Some(p) => PartitionResolution::Found(found, p),
        None => PartitionResolution::NotFound,
    }
}

pub fn topic_name(name: &str) -> TopicName {
    TopicName(StrBytes::from_string(name.to_string()))
}

pub fn str_bytes(value: &str) -> StrBytes {
    StrBytes::from_string(value.to_string())
}
