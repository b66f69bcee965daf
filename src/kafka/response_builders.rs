// Response builder utilities for kafka-protocol types
//
// Constructors shared by several handlers, plus the error-shaped responses
// whose fields have to be filled in a version-safe way.

use kafka_protocol::messages::api_versions_response::{ApiVersion, ApiVersionsResponse};
use kafka_protocol::messages::find_coordinator_response::FindCoordinatorResponse;
use kafka_protocol::messages::join_group_response::JoinGroupResponse;
use kafka_protocol::messages::metadata_response::{
    MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
};
use kafka_protocol::messages::sync_group_response::SyncGroupResponse;
use kafka_protocol::messages::{BrokerId, TopicName};
use kafka_protocol::protocol::StrBytes;

use super::broker::BrokerInfo;
use super::constants::*;
use super::storage::Partition;

/// Build an ApiVersionsResponse announcing the dispatch table
///
/// Entries appear in API key order with the advertised (not the decodable)
/// maximum version.
pub fn build_api_versions_response() -> ApiVersionsResponse {
    let mut response = ApiVersionsResponse::default();
    response.error_code = ERROR_NONE;
    response.throttle_time_ms = 0;
    response.api_keys = SUPPORTED_APIS
        .iter()
        .map(|support| {
            let mut version = ApiVersion::default();
            version.api_key = support.api_key;
            version.min_version = support.min_version;
            version.max_version = support.advertised_max_version;
            version
        })
        .collect();
    response
}

/// ApiVersionsResponse for a client asking at a version we do not serve
///
/// Sent at v0 so any client can read it and retry with a supported version.
pub fn build_api_versions_error_response(error_code: i16) -> ApiVersionsResponse {
    let mut response = build_api_versions_response();
    response.error_code = error_code;
    response
}

/// Build a MetadataResponseBroker
pub fn build_broker_metadata(broker: &BrokerInfo) -> MetadataResponseBroker {
    let mut metadata = MetadataResponseBroker::default();
    metadata.node_id = BrokerId(broker.id);
    metadata.host = StrBytes::from_string(broker.host.clone());
    metadata.port = broker.port;
    metadata.rack = None;
    metadata
}

/// Build a MetadataResponseTopic with partitions
pub fn build_topic_metadata(
    topic_name: &str,
    error_code: i16,
    partitions: Vec<MetadataResponsePartition>,
) -> MetadataResponseTopic {
    let mut topic = MetadataResponseTopic::default();
    topic.error_code = error_code;
    topic.name = Some(TopicName(StrBytes::from_string(topic_name.to_string())));
    topic.is_internal = false;
    topic.partitions = partitions;
    topic
}

/// Build a MetadataResponsePartition; every replica counts as in sync
pub fn build_partition_metadata(partition: &Partition) -> MetadataResponsePartition {
    let replicas: Vec<BrokerId> = partition.replicas().into_iter().map(BrokerId).collect();
    let mut metadata = MetadataResponsePartition::default();
    metadata.error_code = ERROR_NONE;
    metadata.partition_index = partition.index;
    metadata.leader_id = BrokerId(partition.leader());
    metadata.isr_nodes = replicas.clone();
    metadata.replica_nodes = replicas;
    metadata
}

// ========== Error Response Builders ==========

/// Build a FindCoordinatorResponse with an error code
pub fn build_find_coordinator_error_response(error_code: i16) -> FindCoordinatorResponse {
    let mut response = FindCoordinatorResponse::default();
    response.throttle_time_ms = 0;
    response.error_code = error_code;
    response.node_id = BrokerId(-1);
    response.host = StrBytes::from_static_str("");
    response.port = -1;
    response
}

/// Build a JoinGroupResponse with an error code
///
/// Before v7 the protocol name is a non-nullable string.
pub fn build_join_group_error_response(
    error_code: i16,
    member_id: &str,
    api_version: i16,
) -> JoinGroupResponse {
    let mut response = JoinGroupResponse::default();
    response.throttle_time_ms = 0;
    response.error_code = error_code;
    response.generation_id = -1;
    response.protocol_type = None;
    response.protocol_name = if api_version >= 7 {
        None
    } else {
        Some(StrBytes::from_static_str(""))
    };
    response.leader = StrBytes::from_static_str("");
    response.member_id = StrBytes::from_string(member_id.to_string());
    response
}

/// Build a SyncGroupResponse with an error code
pub fn build_sync_group_error_response(error_code: i16) -> SyncGroupResponse {
    let mut response = SyncGroupResponse::default();
    response.throttle_time_ms = 0;
    response.error_code = error_code;
    response
}
