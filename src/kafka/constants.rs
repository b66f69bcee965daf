//! Kafka protocol constants
//!
//! This module centralizes all magic numbers used by the mock broker.
//!
//! # Terminology
//! - **API Key**: Identifies which operation/request type (e.g., 18 = ApiVersions, 3 = Metadata)
//! - **API Version**: Identifies which version of that operation (e.g., Metadata v9)

// ===== API Keys =====
// See: https://kafka.apache.org/protocol.html#protocol_api_key

/// API key for Produce requests
pub const API_KEY_PRODUCE: i16 = 0;

/// API key for Fetch requests
pub const API_KEY_FETCH: i16 = 1;

/// API key for ListOffsets requests
pub const API_KEY_LIST_OFFSETS: i16 = 2;

/// API key for Metadata requests
pub const API_KEY_METADATA: i16 = 3;

/// API key for OffsetCommit requests
pub const API_KEY_OFFSET_COMMIT: i16 = 8;

/// API key for OffsetFetch requests
pub const API_KEY_OFFSET_FETCH: i16 = 9;

/// API key for FindCoordinator requests
pub const API_KEY_FIND_COORDINATOR: i16 = 10;

/// API key for JoinGroup requests
pub const API_KEY_JOIN_GROUP: i16 = 11;

/// API key for Heartbeat requests
pub const API_KEY_HEARTBEAT: i16 = 12;

/// API key for SyncGroup requests
pub const API_KEY_SYNC_GROUP: i16 = 14;

/// API key for ListGroups requests
pub const API_KEY_LIST_GROUPS: i16 = 16;

/// API key for ApiVersions requests
pub const API_KEY_API_VERSIONS: i16 = 18;

/// API key for CreateTopics requests
pub const API_KEY_CREATE_TOPICS: i16 = 19;

// ===== Supported Versions =====

/// Version range served for one API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSupport {
    pub api_key: i16,
    pub min_version: i16,
    /// Highest version accepted by the request decoder
    pub max_version: i16,
    /// Highest version announced in ApiVersions responses
    pub advertised_max_version: i16,
}

const fn api(api_key: i16, min_version: i16, max_version: i16) -> ApiSupport {
    ApiSupport {
        api_key,
        min_version,
        max_version,
        advertised_max_version: max_version,
    }
}

/// Dispatch table, sorted by API key.
///
/// ListOffsets is decoded up to v8 but announced as v7; clients that
/// negotiate from the announcement never send v8.
pub const SUPPORTED_APIS: [ApiSupport; 13] = [
    api(API_KEY_PRODUCE, 0, 8),
    api(API_KEY_FETCH, 0, 11),
    ApiSupport {
        api_key: API_KEY_LIST_OFFSETS,
        min_version: 0,
        max_version: 8,
        advertised_max_version: 7,
    },
    api(API_KEY_METADATA, 0, 9),
    api(API_KEY_OFFSET_COMMIT, 0, 9),
    api(API_KEY_OFFSET_FETCH, 0, 9),
    api(API_KEY_FIND_COORDINATOR, 0, 3),
    api(API_KEY_JOIN_GROUP, 0, 7),
    api(API_KEY_HEARTBEAT, 0, 4),
    api(API_KEY_SYNC_GROUP, 0, 5),
    api(API_KEY_LIST_GROUPS, 0, 4),
    api(API_KEY_API_VERSIONS, 0, 3),
    api(API_KEY_CREATE_TOPICS, 0, 7),
];

/// Look up the served version range for an API key
pub fn api_support(api_key: i16) -> Option<&'static ApiSupport> {
    SUPPORTED_APIS.iter().find(|a| a.api_key == api_key)
}

/// Human readable API name for logs
pub fn api_name(api_key: i16) -> &'static str {
    match api_key {
        API_KEY_PRODUCE => "Produce",
        API_KEY_FETCH => "Fetch",
        API_KEY_LIST_OFFSETS => "ListOffsets",
        API_KEY_METADATA => "Metadata",
        API_KEY_OFFSET_COMMIT => "OffsetCommit",
        API_KEY_OFFSET_FETCH => "OffsetFetch",
        API_KEY_FIND_COORDINATOR => "FindCoordinator",
        API_KEY_JOIN_GROUP => "JoinGroup",
        API_KEY_HEARTBEAT => "Heartbeat",
        API_KEY_SYNC_GROUP => "SyncGroup",
        API_KEY_LIST_GROUPS => "ListGroups",
        API_KEY_API_VERSIONS => "ApiVersions",
        API_KEY_CREATE_TOPICS => "CreateTopics",
        _ => "Unknown",
    }
}

// ===== Flexible Format Thresholds =====

/// Returns the minimum API version where ResponseHeader v1 (flexible format) is used.
///
/// ApiVersions is a special case: its response header is always v0.
pub fn get_flexible_format_threshold(api_key: i16) -> Option<i16> {
    match api_key {
        API_KEY_API_VERSIONS => None,
        API_KEY_PRODUCE => Some(9),
        API_KEY_FETCH => Some(12),
        API_KEY_LIST_OFFSETS => Some(6),
        API_KEY_METADATA => Some(9),
        API_KEY_OFFSET_COMMIT => Some(8),
        API_KEY_OFFSET_FETCH => Some(6),
        API_KEY_FIND_COORDINATOR => Some(3),
        API_KEY_JOIN_GROUP => Some(6),
        API_KEY_HEARTBEAT => Some(4),
        API_KEY_SYNC_GROUP => Some(4),
        API_KEY_LIST_GROUPS => Some(3),
        API_KEY_CREATE_TOPICS => Some(5),
        _ => None,
    }
}

/// Get the ResponseHeader version for an API key and version
pub fn get_response_header_version(api_key: i16, api_version: i16) -> i16 {
    match get_flexible_format_threshold(api_key) {
        Some(threshold) if api_version >= threshold => 1,
        _ => 0,
    }
}

// ===== Network =====

/// Default Kafka protocol port, used when a server URL has none
pub const DEFAULT_KAFKA_PORT: i32 = 9092;

/// URL scheme assumed for server URLs written as `host:port`
pub const DEFAULT_URL_SCHEME: &str = "kafka";

/// Maximum request size (100MB)
pub const MAX_REQUEST_SIZE: i32 = 100_000_000;

/// Default graceful shutdown timeout (milliseconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Minimum shutdown timeout (milliseconds)
pub const MIN_SHUTDOWN_TIMEOUT_MS: u64 = 100;

/// Maximum shutdown timeout (milliseconds)
pub const MAX_SHUTDOWN_TIMEOUT_MS: u64 = 60_000;

// ===== Cluster =====

/// Cluster id reported in Metadata responses
pub const CLUSTER_ID: &str = "mokapi";

/// Trait value attached to every observed record
pub const EVENT_NAMESPACE: &str = "kafka";

// ===== Topics =====

/// Partition count for channels without a `partitions` binding
pub const DEFAULT_TOPIC_PARTITIONS: i32 = 1;

/// Longest legal topic name
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

// ===== Retention Defaults =====

/// `log.retention.ms` default: 7 days
pub const DEFAULT_LOG_RETENTION_MS: i64 = 604_800_000;

/// `log.retention.bytes` default: unlimited
pub const DEFAULT_LOG_RETENTION_BYTES: i64 = -1;

/// `log.segment.ms` default: 7 days
pub const DEFAULT_LOG_SEGMENT_MS: i64 = 604_800_000;

/// `log.retention.check.interval.ms` default: 5 minutes
pub const DEFAULT_LOG_RETENTION_CHECK_INTERVAL_MS: i64 = 300_000;

// ===== Fetch =====

/// A waiting fetch answers this long before the client's own `max_wait_ms`
pub const FETCH_WAIT_HEADROOM_MS: u64 = 200;

/// Default poll interval for long polling fallback (milliseconds)
pub const DEFAULT_FETCH_POLL_INTERVAL_MS: u64 = 100;

/// Minimum poll interval (milliseconds)
pub const MIN_FETCH_POLL_INTERVAL_MS: u64 = 10;

/// Maximum poll interval (milliseconds)
pub const MAX_FETCH_POLL_INTERVAL_MS: u64 = 5000;

// ===== ListOffsets =====

/// Timestamp sentinel asking for the log start offset
pub const LIST_OFFSETS_EARLIEST: i64 = -2;

/// Timestamp sentinel asking for the log end offset
pub const LIST_OFFSETS_LATEST: i64 = -1;

// ===== Consumer Groups =====

/// FindCoordinator key type for consumer groups
pub const COORDINATOR_KEY_TYPE_GROUP: i8 = 0;

/// Default collection window of a rebalance (milliseconds)
pub const DEFAULT_JOIN_WINDOW_MS: u64 = 3000;

/// Minimum collection window (milliseconds)
pub const MIN_JOIN_WINDOW_MS: u64 = 10;

/// Maximum collection window (milliseconds)
pub const MAX_JOIN_WINDOW_MS: u64 = 300_000;

pub const GROUP_STATE_EMPTY: &str = "Empty";
pub const GROUP_STATE_PREPARING_REBALANCE: &str = "PreparingRebalance";
pub const GROUP_STATE_COMPLETING_REBALANCE: &str = "CompletingRebalance";
pub const GROUP_STATE_STABLE: &str = "Stable";

// ===== Kafka Error Codes =====
// See: https://kafka.apache.org/protocol.html#protocol_error_codes

/// No error
pub const ERROR_NONE: i16 = 0;

/// Unknown server error
pub const ERROR_UNKNOWN_SERVER_ERROR: i16 = -1;

/// Requested offset is outside the retained log
pub const ERROR_OFFSET_OUT_OF_RANGE: i16 = 1;

/// Corrupt message (undecodable batch or rejected payload)
pub const ERROR_CORRUPT_MESSAGE: i16 = 2;

/// Unknown topic or partition
pub const ERROR_UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;

/// Coordinator not available
pub const ERROR_COORDINATOR_NOT_AVAILABLE: i16 = 15;

/// Not coordinator for group
pub const ERROR_NOT_COORDINATOR: i16 = 16;

/// Invalid topic name
pub const ERROR_INVALID_TOPIC_EXCEPTION: i16 = 17;

/// Illegal generation (consumer group generation mismatch)
pub const ERROR_ILLEGAL_GENERATION: i16 = 22;

/// Invalid or unknown group id
pub const ERROR_INVALID_GROUP_ID: i16 = 24;

/// Unknown member ID
pub const ERROR_UNKNOWN_MEMBER_ID: i16 = 25;

/// Rebalance in progress
pub const ERROR_REBALANCE_IN_PROGRESS: i16 = 27;

/// Unsupported version
pub const ERROR_UNSUPPORTED_VERSION: i16 = 35;

/// Topic already exists
pub const ERROR_TOPIC_ALREADY_EXISTS: i16 = 36;

/// Member id required before joining
pub const ERROR_MEMBER_ID_REQUIRED: i16 = 79;
