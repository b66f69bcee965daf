// Admin API handlers
//
// CreateTopics: add topics at runtime. Topics created this way have no
// payload schema and survive configuration reloads.

use kafka_protocol::messages::create_topics_request::CreateTopicsRequest;
use kafka_protocol::messages::create_topics_response::{
    CreatableTopicResult, CreateTopicsResponse,
};
use tracing::{info, warn};

use super::helpers::str_bytes;
use crate::kafka::cluster_config::ChannelConfig;
use crate::kafka::constants::*;
use crate::kafka::error::KafkaError;
use crate::kafka::handler_context::HandlerContext;
use crate::kafka::storage::validate_topic_name;

/// Handle CreateTopics request
///
/// Creates topics with the specified partition count. Topics that already
/// exist return TOPIC_ALREADY_EXISTS. With `validate_only` nothing is
/// created but the same checks run.
pub fn handle_create_topics(
    ctx: &HandlerContext<'_>,
    request: CreateTopicsRequest,
) -> CreateTopicsResponse {
    let mut response = CreateTopicsResponse::default();
    response.throttle_time_ms = 0;

    for topic in request.topics {
        let name = topic.name.to_string();
        let mut result = CreatableTopicResult::default();
        result.name = topic.name.clone();

        // -1 asks for the broker default
        let num_partitions = if topic.num_partitions <= 0 {
            DEFAULT_TOPIC_PARTITIONS
        } else {
            topic.num_partitions
        };

        let outcome = validate_topic_name(&name).and_then(|_| {
            if request.validate_only {
                match ctx.store.topic(&name) {
                    Some(_) => Err(KafkaError::TopicAlreadyExists(name.clone())),
                    None => Ok(()),
                }
            } else {
                ctx.store
                    .add_topic(&name, &ChannelConfig::with_partitions(num_partitions))
                    .map(|_| ())
            }
        });

        match outcome {
            Ok(()) => {
                if !request.validate_only {
                    info!(
                        "Created topic '{}' with {} partition(s)",
                        name, num_partitions
                    );
                }
                result.error_code = ERROR_NONE;
                if ctx.at_least(5) {
                    result.num_partitions = num_partitions;
                    result.replication_factor = topic.replication_factor.max(1);
                }
            }
            Err(e) => {
                warn!("CreateTopics '{}' failed: {}", name, e);
                result.error_code = e.to_kafka_error_code();
                if ctx.at_least(1) {
                    result.error_message = Some(str_bytes(&e.to_string()));
                }
                if ctx.at_least(5) {
                    result.num_partitions = -1;
                    result.replication_factor = -1;
                }
            }
        }

        response.topics.push(result);
    }

    response
}
