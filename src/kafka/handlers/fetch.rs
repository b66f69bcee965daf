// Fetch handlers
//
// Handlers for FetchRequest and ListOffsetsRequest.
// These are read-focused APIs for consuming messages from topics.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use kafka_protocol::messages::fetch_request::FetchRequest;
use kafka_protocol::messages::fetch_response::{
    FetchResponse, FetchableTopicResponse, PartitionData,
};
use kafka_protocol::messages::list_offsets_request::ListOffsetsRequest;
use kafka_protocol::messages::list_offsets_response::{
    ListOffsetsPartitionResponse, ListOffsetsResponse, ListOffsetsTopicResponse,
};
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use super::helpers::{resolve_partition, PartitionResolution};
use crate::kafka::constants::*;
use crate::kafka::error::Result;
use crate::kafka::handler_context::HandlerContext;
use crate::kafka::pending_fetches::TopicPartitionKey;
use crate::kafka::protocol::encode_records;

/// Handle Fetch request
///
/// Answers at once when `min_bytes` is already satisfied or the client is
/// not willing to wait. Otherwise the request waits for appends to any of
/// its partitions until `max_wait_ms - 200` has passed, re-reading after
/// every wake-up.
pub async fn handle_fetch(
    ctx: &HandlerContext<'_>,
    request: FetchRequest,
) -> Result<FetchResponse> {
    let min_bytes = request.min_bytes.max(0) as usize;
    let wait = min_bytes > 0 && request.max_wait_ms > 0;

    if !wait {
        let (response, _) = read_fetch(ctx, &request)?;
        return Ok(response);
    }

    let max_wait = Duration::from_millis(request.max_wait_ms as u64);
    let deadline =
        Instant::now() + max_wait.saturating_sub(Duration::from_millis(FETCH_WAIT_HEADROOM_MS));

    // Register before the first read so no append slips in unnoticed
    let notify = Arc::new(Notify::new());
    let pending = ctx.store.pending_fetches();
    let mut keys = Vec::new();
    for topic in &request.topics {
        for partition in &topic.partitions {
            let key = TopicPartitionKey::new(topic.topic.to_string(), partition.partition);
            pending.register(key.clone(), partition.fetch_offset, &notify).await;
            keys.push(key);
        }
    }

    let result = wait_for_bytes(ctx, &request, &notify, min_bytes, deadline).await;

    pending.unregister(&keys, &notify).await;
    result
}

/// Re-read until `min_bytes` are available or `deadline` passes
///
/// Wakes on append notifications, and at least every poll interval.
async fn wait_for_bytes(
    ctx: &HandlerContext<'_>,
    request: &FetchRequest,
    notify: &Notify,
    min_bytes: usize,
    deadline: Instant,
) -> Result<FetchResponse> {
    let poll_interval = ctx.store.options().fetch_poll_interval;
    loop {
        let (response, bytes) = read_fetch(ctx, request)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if bytes >= min_bytes || remaining.is_zero() {
            return Ok(response);
        }
        debug!(
            "Fetch has {} of {} bytes, waiting up to {:?}",
            bytes, min_bytes, remaining
        );
        let _ = timeout(poll_interval.min(remaining), notify.notified()).await;
    }
}

/// One pass over every requested partition
///
/// Returns the response and the number of record bytes it carries.
fn read_fetch(ctx: &HandlerContext<'_>, request: &FetchRequest) -> Result<(FetchResponse, usize)> {
    let mut response = FetchResponse::default();
    response.throttle_time_ms = 0;

    let max_bytes = if request.max_bytes > 0 {
        request.max_bytes as usize
    } else {
        i32::MAX as usize
    };
    let mut total = 0usize;

    for fetch_topic in &request.topics {
        let topic_name = fetch_topic.topic.to_string();
        let mut topic_response = FetchableTopicResponse::default();
        topic_response.topic = fetch_topic.topic.clone();

        for fetch_partition in &fetch_topic.partitions {
            let mut partition_data = PartitionData::default();
            partition_data.partition_index = fetch_partition.partition;

            let partition =
                match resolve_partition(ctx.store, &topic_name, fetch_partition.partition) {
                    PartitionResolution::Found(_, partition) => partition,
                    PartitionResolution::NotFound => {
                        partition_data.error_code = ERROR_UNKNOWN_TOPIC_OR_PARTITION;
                        partition_data.high_watermark = -1;
                        partition_data.records = Some(Bytes::new());
                        topic_response.partitions.push(partition_data);
                        continue;
                    }
                };

            let high_watermark = partition.offset();
            partition_data.high_watermark = high_watermark;
            if ctx.at_least(4) {
                partition_data.last_stable_offset = high_watermark;
            }
            if ctx.at_least(5) {
                partition_data.log_start_offset = partition.start_offset();
            }

            let budget = (fetch_partition.partition_max_bytes.max(0) as usize)
                .min(max_bytes.saturating_sub(total));
            let records = if budget == 0 {
                Vec::new()
            } else {
                match partition.read(fetch_partition.fetch_offset, budget as i32) {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(
                            topic = %topic_name,
                            partition = fetch_partition.partition,
                            "{}",
                            e
                        );
                        partition_data.error_code = e.to_kafka_error_code();
                        partition_data.records = Some(Bytes::new());
                        topic_response.partitions.push(partition_data);
                        continue;
                    }
                }
            };

            let encoded = encode_records(&records, ctx.api_version)?;
            total += encoded.len();
            partition_data.error_code = ERROR_NONE;
            partition_data.records = Some(encoded);
            topic_response.partitions.push(partition_data);
        }

        response.responses.push(topic_response);
    }

    Ok((response, total))
}

/// Handle ListOffsets request
///
/// Timestamp -2 (or 0) resolves to the log start, -1 to the log end. Any
/// other timestamp is accepted and answered with offset 0.
pub fn handle_list_offsets(
    ctx: &HandlerContext<'_>,
    request: ListOffsetsRequest,
) -> ListOffsetsResponse {
    let mut response = ListOffsetsResponse::default();
    response.throttle_time_ms = 0;

    for topic in request.topics {
        let topic_name = topic.name.to_string();
        let mut topic_response = ListOffsetsTopicResponse::default();
        topic_response.name = topic.name.clone();

        for requested in topic.partitions {
            let mut partition_response = ListOffsetsPartitionResponse::default();
            partition_response.partition_index = requested.partition_index;

            let offset = match resolve_partition(ctx.store, &topic_name, requested.partition_index)
            {
                PartitionResolution::Found(_, partition) => match requested.timestamp {
                    LIST_OFFSETS_EARLIEST | 0 => partition.start_offset(),
                    LIST_OFFSETS_LATEST => partition.offset(),
                    _ => 0,
                },
                PartitionResolution::NotFound => {
                    partition_response.error_code = ERROR_UNKNOWN_TOPIC_OR_PARTITION;
                    topic_response.partitions.push(partition_response);
                    continue;
                }
            };

            partition_response.error_code = ERROR_NONE;
            if ctx.at_least(1) {
                partition_response.offset = offset;
                partition_response.timestamp = -1;
            } else {
                partition_response.old_style_offsets = vec![offset];
            }
            topic_response.partitions.push(partition_response);
        }

        response.topics.push(topic_response);
    }

    response
}
