// Kafka protocol handlers
//
// One function per API. Each handler takes the `HandlerContext` for the
// request plus the decoded body and returns the response body. Per-item
// failures are reported as error codes inside the response.
//
// Module organization:
// - helpers: topic/partition resolution and name conversions
// - metadata: ApiVersions and Metadata request handlers
// - produce: ProduceRequest handler
// - fetch: FetchRequest and ListOffsetsRequest handlers
// - consumer: OffsetCommit and OffsetFetch handlers
// - coordinator: consumer group coordination (FindCoordinator, JoinGroup, SyncGroup, ...)
// - admin: CreateTopics

mod admin;
mod consumer;
mod coordinator;
mod fetch;
mod helpers;
mod metadata;
mod produce;


// Re-export all handlers
pub use admin::handle_create_topics;
pub use consumer::{handle_offset_commit, handle_offset_fetch};
pub use coordinator::{
    handle_find_coordinator, handle_heartbeat, handle_join_group, handle_list_groups,
    handle_sync_group,
};
pub use fetch::{handle_fetch, handle_list_offsets};
pub use helpers::{resolve_partition, topic_name, PartitionResolution};
pub use metadata::{handle_api_versions, handle_metadata};
pub use produce::handle_produce;
