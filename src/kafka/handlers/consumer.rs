// Consumer offset handlers
//
// Handlers for OffsetCommit and OffsetFetch requests.
// These track consumer group progress through partitions.

use kafka_protocol::messages::offset_commit_request::OffsetCommitRequest;
use kafka_protocol::messages::offset_commit_response::{
    OffsetCommitResponse, OffsetCommitResponsePartition, OffsetCommitResponseTopic,
};
use kafka_protocol::messages::offset_fetch_request::OffsetFetchRequest;
use kafka_protocol::messages::offset_fetch_response::{
    OffsetFetchResponse, OffsetFetchResponseGroup, OffsetFetchResponsePartition,
    OffsetFetchResponsePartitions, OffsetFetchResponseTopic, OffsetFetchResponseTopics,
};
use kafka_protocol::messages::GroupId;
use tracing::debug;

use super::helpers::{resolve_partition, str_bytes, topic_name, PartitionResolution};
use crate::kafka::constants::*;
use crate::kafka::handler_context::HandlerContext;

/// Handle OffsetCommit request
///
/// Commits consumer offsets for a consumer group. Checks run per partition
/// in this order: partition exists, client joined the group, offset is not
/// past the log end, group exists.
pub fn handle_offset_commit(
    ctx: &HandlerContext<'_>,
    request: OffsetCommitRequest,
) -> OffsetCommitResponse {
    let group_id = request.group_id.to_string();
    let is_member = ctx.client.member_id(&group_id).is_some();
    let group = ctx.store.group(&group_id);

    let mut response = OffsetCommitResponse::default();
    response.throttle_time_ms = 0;

    for topic in request.topics {
        let name = topic.name.to_string();
        let mut topic_response = OffsetCommitResponseTopic::default();
        topic_response.name = topic.name.clone();

        for requested in topic.partitions {
            let mut partition_response = OffsetCommitResponsePartition::default();
            partition_response.partition_index = requested.partition_index;

            partition_response.error_code =
                match resolve_partition(ctx.store, &name, requested.partition_index) {
                    PartitionResolution::NotFound => ERROR_UNKNOWN_TOPIC_OR_PARTITION,
                    PartitionResolution::Found(..) if !is_member => ERROR_UNKNOWN_MEMBER_ID,
                    PartitionResolution::Found(_, partition)
                        if requested.committed_offset > partition.offset() =>
                    {
                        ERROR_OFFSET_OUT_OF_RANGE
                    }
                    PartitionResolution::Found(_, partition) => match &group {
                        None => ERROR_INVALID_GROUP_ID,
                        Some(group) => {
                            ctx.store
                                .commit(group, &name, &partition, requested.committed_offset);
                            debug!(
                                group = %group_id,
                                topic = %name,
                                partition = requested.partition_index,
                                "Committed offset {}",
                                requested.committed_offset
                            );
                            ERROR_NONE
                        }
                    },
                };

            topic_response.partitions.push(partition_response);
        }

        response.topics.push(topic_response);
    }

    response
}

/// Per-partition outcome of an offset lookup: (partition, offset, error)
type FetchedTopic = (String, Vec<(i32, i64, i16)>);

/// Handle OffsetFetch request
///
/// Fetches committed offsets for a consumer group. From v8 the request
/// batches several groups; each is answered with the same rules.
pub fn handle_offset_fetch(
    ctx: &HandlerContext<'_>,
    request: OffsetFetchRequest,
) -> OffsetFetchResponse {
    let mut response = OffsetFetchResponse::default();
    response.throttle_time_ms = 0;

    if ctx.at_least(8) {
        for requested in request.groups {
            let group_id = requested.group_id.to_string();
            let requested_topics = requested.topics.map(|topics| {
                topics
                    .into_iter()
                    .map(|t| (t.name.to_string(), t.partition_indexes))
                    .collect()
            });
            let (error_code, topics) = fetch_offsets(ctx, &group_id, requested_topics);

            let mut group = OffsetFetchResponseGroup::default();
            group.group_id = GroupId(str_bytes(&group_id));
            group.error_code = error_code;
            group.topics = topics
                .into_iter()
                .map(|(name, partitions)| {
                    let mut topic = OffsetFetchResponseTopics::default();
                    topic.name = topic_name(&name);
                    topic.partitions = partitions
                        .into_iter()
                        .map(|(index, offset, code)| {
                            let mut partition = OffsetFetchResponsePartitions::default();
                            partition.partition_index = index;
                            partition.committed_offset = offset;
                            partition.committed_leader_epoch = -1;
                            partition.metadata = Some(str_bytes(""));
                            partition.error_code = code;
                            partition
                        })
                        .collect();
                    topic
                })
                .collect();
            response.groups.push(group);
        }
        return response;
    }

    let group_id = request.group_id.to_string();
    let requested_topics = request.topics.map(|topics| {
        topics
            .into_iter()
            .map(|t| (t.name.to_string(), t.partition_indexes))
            .collect()
    });
    let (error_code, topics) = fetch_offsets(ctx, &group_id, requested_topics);

    if ctx.at_least(2) {
        response.error_code = error_code;
    }
    response.topics = topics
        .into_iter()
        .map(|(name, partitions)| {
            let mut topic = OffsetFetchResponseTopic::default();
            topic.name = topic_name(&name);
            topic.partitions = partitions
                .into_iter()
                .map(|(index, offset, code)| {
                    let mut partition = OffsetFetchResponsePartition::default();
                    partition.partition_index = index;
                    partition.committed_offset = offset;
                    if ctx.at_least(5) {
                        partition.committed_leader_epoch = -1;
                    }
                    partition.metadata = Some(str_bytes(""));
                    partition.error_code = code;
                    partition
                })
                .collect();
            topic
        })
        .collect();

    response
}

/// Look up commits for one group
///
/// `None` topics means every commit the group holds. Returns the
/// group-level error code along with the per-partition results.
fn fetch_offsets(
    ctx: &HandlerContext<'_>,
    group_id: &str,
    topics: Option<Vec<(String, Vec<i32>)>>,
) -> (i16, Vec<FetchedTopic>) {
    let is_member = ctx.client.member_id(group_id).is_some();
    let group = ctx.store.group(group_id);

    let Some(topics) = topics else {
        return match (&group, is_member) {
            (_, false) => (ERROR_UNKNOWN_MEMBER_ID, Vec::new()),
            (None, true) => (ERROR_INVALID_GROUP_ID, Vec::new()),
            (Some(group), true) => {
                let mut fetched: Vec<FetchedTopic> = Vec::new();
                for (topic, partition, offset) in group.commits() {
                    match fetched.last_mut() {
                        Some((name, partitions)) if *name == topic => {
                            partitions.push((partition, offset, ERROR_NONE));
                        }
                        _ => fetched.push((topic, vec![(partition, offset, ERROR_NONE)])),
                    }
                }
                (ERROR_NONE, fetched)
            }
        };
    };

    let fetched = topics
        .into_iter()
        .map(|(name, partition_indexes)| {
            let partitions = partition_indexes
                .into_iter()
                .map(|index| match resolve_partition(ctx.store, &name, index) {
                    PartitionResolution::NotFound => {
                        (index, -1, ERROR_UNKNOWN_TOPIC_OR_PARTITION)
                    }
                    PartitionResolution::Found(..) if !is_member => {
                        (index, -1, ERROR_UNKNOWN_MEMBER_ID)
                    }
                    PartitionResolution::Found(..) => match &group {
                        None => (index, -1, ERROR_INVALID_GROUP_ID),
                        Some(group) => (
                            index,
                            group.committed(&name, index).unwrap_or(-1),
                            ERROR_NONE,
                        ),
                    },
                })
                .collect();
            (name, partitions)
        })
        .collect();

    (ERROR_NONE, fetched)
}
