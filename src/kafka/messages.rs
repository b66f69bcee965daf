// Request and response message types
//
// A framed request is decoded into a `KafkaRequest`: the common header plus a
// tagged union of the concrete kafka-protocol request bodies. Handlers answer
// with a `KafkaResponse` carrying the matching response body, which the
// connection's writer task encodes at the request's API version.

use bytes::Bytes;
use kafka_protocol::messages::{
    ApiVersionsRequest, ApiVersionsResponse, CreateTopicsRequest, CreateTopicsResponse,
    FetchRequest, FetchResponse, FindCoordinatorRequest, FindCoordinatorResponse,
    HeartbeatRequest, HeartbeatResponse, JoinGroupRequest, JoinGroupResponse, ListGroupsRequest,
    ListGroupsResponse, ListOffsetsRequest, ListOffsetsResponse, MetadataRequest,
    MetadataResponse, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest,
    OffsetFetchResponse, ProduceRequest, ProduceResponse, SyncGroupRequest, SyncGroupResponse,
};

use super::constants::*;

/// Common request header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: i16,
    pub api_version: i16,
    /// Client-assigned id, echoed back in the response
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

/// Decoded request body, selected by API key
#[derive(Debug, Clone)]
pub enum RequestMessage {
    Produce(ProduceRequest),
    Fetch(FetchRequest),
    ListOffsets(ListOffsetsRequest),
    Metadata(MetadataRequest),
    OffsetCommit(OffsetCommitRequest),
    OffsetFetch(OffsetFetchRequest),
    FindCoordinator(FindCoordinatorRequest),
    JoinGroup(JoinGroupRequest),
    Heartbeat(HeartbeatRequest),
    SyncGroup(SyncGroupRequest),
    ListGroups(ListGroupsRequest),
    ApiVersions(ApiVersionsRequest),
    CreateTopics(CreateTopicsRequest),
}

impl RequestMessage {
    pub fn api_key(&self) -> i16 {
        match self {
            RequestMessage::Produce(_) => API_KEY_PRODUCE,
            RequestMessage::Fetch(_) => API_KEY_FETCH,
            RequestMessage::ListOffsets(_) => API_KEY_LIST_OFFSETS,
            RequestMessage::Metadata(_) => API_KEY_METADATA,
            RequestMessage::OffsetCommit(_) => API_KEY_OFFSET_COMMIT,
            RequestMessage::OffsetFetch(_) => API_KEY_OFFSET_FETCH,
            RequestMessage::FindCoordinator(_) => API_KEY_FIND_COORDINATOR,
            RequestMessage::JoinGroup(_) => API_KEY_JOIN_GROUP,
            RequestMessage::Heartbeat(_) => API_KEY_HEARTBEAT,
            RequestMessage::SyncGroup(_) => API_KEY_SYNC_GROUP,
            RequestMessage::ListGroups(_) => API_KEY_LIST_GROUPS,
            RequestMessage::ApiVersions(_) => API_KEY_API_VERSIONS,
            RequestMessage::CreateTopics(_) => API_KEY_CREATE_TOPICS,
        }
    }
}

/// A fully decoded request
#[derive(Debug, Clone)]
pub struct KafkaRequest {
    pub header: RequestHeader,
    pub message: RequestMessage,
}

impl KafkaRequest {
    pub fn new(header: RequestHeader, message: RequestMessage) -> Self {
        Self { header, message }
    }

    pub fn api_version(&self) -> i16 {
        self.header.api_version
    }
}

/// Response body, one variant per request variant
#[derive(Debug, Clone)]
pub enum ResponseMessage {
    Produce(ProduceResponse),
    Fetch(FetchResponse),
    ListOffsets(ListOffsetsResponse),
    Metadata(MetadataResponse),
    OffsetCommit(OffsetCommitResponse),
    OffsetFetch(OffsetFetchResponse),
    FindCoordinator(FindCoordinatorResponse),
    JoinGroup(JoinGroupResponse),
    Heartbeat(HeartbeatResponse),
    SyncGroup(SyncGroupResponse),
    ListGroups(ListGroupsResponse),
    ApiVersions(ApiVersionsResponse),
    CreateTopics(CreateTopicsResponse),
}

impl ResponseMessage {
    pub fn api_key(&self) -> i16 {
        match self {
            ResponseMessage::Produce(_) => API_KEY_PRODUCE,
            ResponseMessage::Fetch(_) => API_KEY_FETCH,
            ResponseMessage::ListOffsets(_) => API_KEY_LIST_OFFSETS,
            ResponseMessage::Metadata(_) => API_KEY_METADATA,
            ResponseMessage::OffsetCommit(_) => API_KEY_OFFSET_COMMIT,
            ResponseMessage::OffsetFetch(_) => API_KEY_OFFSET_FETCH,
            ResponseMessage::FindCoordinator(_) => API_KEY_FIND_COORDINATOR,
            ResponseMessage::JoinGroup(_) => API_KEY_JOIN_GROUP,
            ResponseMessage::Heartbeat(_) => API_KEY_HEARTBEAT,
            ResponseMessage::SyncGroup(_) => API_KEY_SYNC_GROUP,
            ResponseMessage::ListGroups(_) => API_KEY_LIST_GROUPS,
            ResponseMessage::ApiVersions(_) => API_KEY_API_VERSIONS,
            ResponseMessage::CreateTopics(_) => API_KEY_CREATE_TOPICS,
        }
    }
}

/// A response ready for encoding
#[derive(Debug, Clone)]
pub struct KafkaResponse {
    pub correlation_id: i32,
    /// Version the body is encoded at (normally the request's version)
    pub api_version: i16,
    pub message: ResponseMessage,
}

impl KafkaResponse {
    /// Answer `header` at the version it was sent with
    pub fn new(header: &RequestHeader, message: ResponseMessage) -> Self {
        Self {
            correlation_id: header.correlation_id,
            api_version: header.api_version,
            message,
        }
    }

    pub fn api_key(&self) -> i16 {
        self.message.api_key()
    }
}

/// One record of a partition log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Assigned on append
    pub offset: i64,
    /// Milliseconds since the Unix epoch; zero until the partition stamps it
    pub time: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RecordHeader>,
}

/// Record header (key-value metadata)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Option<Bytes>,
}

impl Record {
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            key,
            value,
            ..Default::default()
        }
    }

    /// Encoded length of this record inside a v2 batch whose first record
    /// has `base_offset` and `base_time`.
    pub fn size(&self, base_offset: i64, base_time: i64) -> usize {
        let mut body = 1; // attributes
        body += varint_len(self.time - base_time);
        body += varint_len(self.offset - base_offset);
        body += nullable_bytes_len(self.key.as_deref());
        body += nullable_bytes_len(self.value.as_deref());
        body += varint_len(self.headers.len() as i64);
        for header in &self.headers {
            body += varint_len(header.key.len() as i64) + header.key.len();
            body += nullable_bytes_len(header.value.as_deref());
        }
        varint_len(body as i64) + body
    }

    /// Encoded length of this record as the first record of a batch
    pub fn standalone_size(&self) -> usize {
        self.size(self.offset, self.time)
    }
}

fn nullable_bytes_len(bytes: Option<&[u8]>) -> usize {
    match bytes {
        Some(b) => varint_len(b.len() as i64) + b.len(),
        None => varint_len(-1),
    }
}

/// Length of a zigzag varint
fn varint_len(value: i64) -> usize {
    let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
    let mut len = 1;
    while zigzag >= 0x80 {
        zigzag >>= 7;
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(-1), 1);
        assert_eq!(varint_len(63), 1);
        assert_eq!(varint_len(64), 2);
        assert_eq!(varint_len(-65), 2);
        assert_eq!(varint_len(i64::MAX), 10);
    }

    #[test]
    fn test_record_size_key_value() {
        let record = Record::new(
            Some(Bytes::from_static(b"foo")),
            Some(Bytes::from_static(b"bar")),
        );
        // attributes + ts delta + offset delta + key(1+3) + value(1+3) + header count
        assert_eq!(record.standalone_size(), 1 + 12);
    }

    #[test]
    fn test_record_size_with_headers_and_null_key() {
        let record = Record {
            value: Some(Bytes::from_static(b"v")),
            headers: vec![RecordHeader {
                key: "h".into(),
                value: None,
            }],
            ..Default::default()
        };
        // 1 + 1 + 1 + key(1) + value(2) + count(1) + header key(2) + header value(1)
        assert_eq!(record.standalone_size(), 1 + 10);
    }

    #[test]
    fn test_record_size_grows_with_deltas() {
        let record = Record {
            offset: 1000,
            time: 1_700_000_000_000,
            ..Default::default()
        };
        assert!(record.size(0, 0) > record.standalone_size());
    }
}
