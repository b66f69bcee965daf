// Produce handler
//
// Handles ProduceRequest - appending record batches to partition logs.

use kafka_protocol::messages::produce_request::ProduceRequest;
use kafka_protocol::messages::produce_response::{
    PartitionProduceResponse, ProduceResponse, TopicProduceResponse,
};
use tracing::{debug, warn};

use super::helpers::{resolve_partition, str_bytes, PartitionResolution};
use crate::kafka::constants::*;
use crate::kafka::handler_context::HandlerContext;
use crate::kafka::protocol::parse_record_batch;

/// Handle Produce request
///
/// Partitions are written in request order. A failure only affects the
/// partition it happened on.
pub async fn handle_produce(ctx: &HandlerContext<'_>, request: ProduceRequest) -> ProduceResponse {
    let mut response = ProduceResponse::default();
    response.throttle_time_ms = 0;

    for topic_data in request.topic_data {
        let topic_name = topic_data.name.to_string();
        let mut topic_response = TopicProduceResponse::default();
        topic_response.name = topic_data.name.clone();

        for partition_data in topic_data.partition_data {
            let partition_index = partition_data.index;
            let mut partition_response = PartitionProduceResponse::default();
            partition_response.index = partition_index;
            partition_response.base_offset = -1;
            partition_response.log_append_time_ms = -1;

            let (topic, partition) =
                match resolve_partition(ctx.store, &topic_name, partition_index) {
                    PartitionResolution::Found(topic, partition) => (topic, partition),
                    PartitionResolution::NotFound => {
                        warn!(
                            topic = %topic_name,
                            partition = partition_index,
                            "Produce to unknown topic or partition"
                        );
                        partition_response.error_code = ERROR_UNKNOWN_TOPIC_OR_PARTITION;
                        topic_response.partition_responses.push(partition_response);
                        continue;
                    }
                };

            let batch = match partition_data.records.as_ref().map(parse_record_batch) {
                Some(Ok(records)) => records,
                None => Vec::new(),
                Some(Err(e)) => {
                    warn!(topic = %topic_name, partition = partition_index, "{}", e);
                    partition_response.error_code = e.to_kafka_error_code();
                    topic_response.partition_responses.push(partition_response);
                    continue;
                }
            };

            let count = batch.len();
            match ctx.store.append(&topic, &partition, batch).await {
                Ok(base_offset) => {
                    debug!(
                        topic = %topic_name,
                        partition = partition_index,
                        "Appended {} record(s) at offset {}",
                        count,
                        base_offset
                    );
                    partition_response.error_code = ERROR_NONE;
                    partition_response.base_offset = base_offset;
                    if ctx.at_least(5) {
                        partition_response.log_start_offset = partition.start_offset();
                    }
                }
                Err(e) => {
                    warn!(
                        topic = %topic_name,
                        partition = partition_index,
                        "Rejected batch: {}",
                        e
                    );
                    partition_response.error_code = e.to_kafka_error_code();
                    if ctx.at_least(8) {
                        partition_response.error_message = Some(str_bytes(&e.to_string()));
                    }
                }
            }

            topic_response.partition_responses.push(partition_response);
        }

        response.responses.push(topic_response);
    }

    response
}
