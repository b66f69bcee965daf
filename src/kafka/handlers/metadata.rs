// Metadata handlers
//
// Handlers for ApiVersions and Metadata requests.
// These are discovery-focused APIs that help clients understand broker capabilities.

use kafka_protocol::messages::api_versions_response::ApiVersionsResponse;
use kafka_protocol::messages::metadata_request::MetadataRequest;
use kafka_protocol::messages::metadata_response::MetadataResponse;
use kafka_protocol::messages::BrokerId;
use tracing::debug;

use super::helpers::str_bytes;
use crate::kafka::constants::*;
use crate::kafka::handler_context::HandlerContext;
use crate::kafka::response_builders::{
    build_api_versions_response, build_broker_metadata, build_partition_metadata,
    build_topic_metadata,
};
use crate::kafka::storage::{validate_topic_name, Topic};

/// Handle ApiVersions request
///
/// This handler doesn't need the store - it just returns static protocol information
pub fn handle_api_versions() -> ApiVersionsResponse {
    build_api_versions_response()
}

/// Handle Metadata request
///
/// Returns every broker, then either the requested topics (in request
/// order) or, for an empty list, every topic the serving broker exposes.
pub fn handle_metadata(ctx: &mut HandlerContext<'_>, request: MetadataRequest) -> MetadataResponse {
    ctx.client.allow_auto_topic_creation = request.allow_auto_topic_creation;

    let broker = ctx.broker();
    let mut response = MetadataResponse::default();
    response.throttle_time_ms = 0;
    response.brokers = ctx
        .store
        .brokers()
        .iter()
        .map(build_broker_metadata)
        .collect();
    if ctx.at_least(1) {
        response.controller_id = BrokerId(broker.as_ref().map(|b| b.id).unwrap_or(-1));
    }
    if ctx.at_least(2) {
        response.cluster_id = Some(str_bytes(CLUSTER_ID));
    }

    // A broker missing from the configuration filters nothing out
    let visible = |topic: &Topic| match &broker {
        Some(b) => topic.is_visible_to(&b.name),
        None => true,
    };

    let requested: Vec<String> = request
        .topics
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| t.name.map(|n| n.to_string()))
        .collect();

    if requested.is_empty() {
        for topic in ctx.store.topics().iter().filter(|t| visible(t)) {
            let partitions = topic
                .partitions()
                .iter()
                .map(|p| build_partition_metadata(p))
                .collect();
            response
                .topics
                .push(build_topic_metadata(&topic.name, ERROR_NONE, partitions));
        }
        return response;
    }

    for name in requested {
        if let Err(e) = validate_topic_name(&name) {
            debug!("Metadata for invalid topic: {}", e);
            response.topics.push(build_topic_metadata(
                &name,
                ERROR_INVALID_TOPIC_EXCEPTION,
                Vec::new(),
            ));
            continue;
        }

        match ctx.store.topic(&name).filter(|t| visible(t)) {
            Some(topic) => {
                let partitions = topic
                    .partitions()
                    .iter()
                    .map(|p| build_partition_metadata(p))
                    .collect();
                response
                    .topics
                    .push(build_topic_metadata(&name, ERROR_NONE, partitions));
            }
            None => {
                response.topics.push(build_topic_metadata(
                    &name,
                    ERROR_UNKNOWN_TOPIC_OR_PARTITION,
                    Vec::new(),
                ));
            }
        }
    }

    response
}
