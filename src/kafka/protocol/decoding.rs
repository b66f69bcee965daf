// Request decoding
//
// A frame (length prefix already stripped by LengthDelimitedCodec) is
// [RequestHeader][RequestBody]. The header is checked against the dispatch
// table before the body is decoded, so unknown keys and unsupported
// versions are reported without touching the body.

use bytes::{Buf, BytesMut};
use kafka_protocol::messages::{
    ApiVersionsRequest, CreateTopicsRequest, FetchRequest, FindCoordinatorRequest,
    HeartbeatRequest, JoinGroupRequest, ListGroupsRequest, ListOffsetsRequest, MetadataRequest,
    OffsetCommitRequest, OffsetFetchRequest, ProduceRequest, SyncGroupRequest,
};
use kafka_protocol::messages::ApiKey;
use kafka_protocol::protocol::buf::ByteBuf;
use kafka_protocol::protocol::Decodable;
use tracing::debug;

use super::super::constants::*;
use super::super::error::{KafkaError, Result};
use super::super::messages::{KafkaRequest, RequestHeader, RequestMessage};

/// Decode a whole request frame
pub fn parse_request(mut frame: BytesMut) -> Result<KafkaRequest> {
    let header = decode_header(&mut frame)?;
    let message = decode_body(&header, &mut frame)?;
    Ok(KafkaRequest::new(header, message))
}

/// Decode the request header from the provided buffer (kafka-protocol 0.16 helper,
/// absent from 0.15)
fn decode_request_header_from_buffer<B: ByteBuf>(
    buf: &mut B,
) -> anyhow::Result<kafka_protocol::messages::RequestHeader> {
    let api_key = ApiKey::try_from(bytes::Buf::get_i16(&mut buf.peek_bytes(0..2)))
        .map_err(|_| anyhow::Error::msg("Unknown API key"))?;
    let api_version = bytes::Buf::get_i16(&mut buf.peek_bytes(2..4));
    let header_version = api_key.request_header_version(api_version);
    kafka_protocol::messages::RequestHeader::decode(buf, header_version)
}

/// Decode the request header, rejecting API keys outside the dispatch table
pub fn decode_header(frame: &mut BytesMut) -> Result<RequestHeader> {
    if frame.remaining() < 4 {
        return Err(KafkaError::corrupt(format!(
            "request frame too short: {} bytes",
            frame.remaining()
        )));
    }
    let api_key = (&frame[..2]).get_i16();
    if api_support(api_key).is_none() {
        return Err(KafkaError::UnsupportedApiKey(api_key));
    }

    let header = decode_request_header_from_buffer(frame)?;
    let header = RequestHeader {
        api_key: header.request_api_key,
        api_version: header.request_api_version,
        correlation_id: header.correlation_id,
        client_id: header.client_id.map(|s| s.to_string()),
    };

    debug!(
        "Parsed RequestHeader: api={} v{}, correlation_id={}, client_id={:?}",
        api_name(header.api_key),
        header.api_version,
        header.correlation_id,
        header.client_id
    );
    Ok(header)
}

macro_rules! decode_as {
    ($variant:ident, $request:ty, $buf:expr, $version:expr) => {
        RequestMessage::$variant(<$request>::decode($buf, $version)?)
    };
}

/// Decode the body selected by the header's API key
pub fn decode_body(header: &RequestHeader, body: &mut BytesMut) -> Result<RequestMessage> {
    let support =
        api_support(header.api_key).ok_or(KafkaError::UnsupportedApiKey(header.api_key))?;
    let version = header.api_version;
    if version < support.min_version || version > support.max_version {
        return Err(KafkaError::UnsupportedVersion {
            api_key: header.api_key,
            api_version: version,
        });
    }

    let message = match header.api_key {
        API_KEY_PRODUCE => decode_as!(Produce, ProduceRequest, body, version),
        API_KEY_FETCH => decode_as!(Fetch, FetchRequest, body, version),
        API_KEY_LIST_OFFSETS => decode_as!(ListOffsets, ListOffsetsRequest, body, version),
        API_KEY_METADATA => decode_as!(Metadata, MetadataRequest, body, version),
        API_KEY_OFFSET_COMMIT => decode_as!(OffsetCommit, OffsetCommitRequest, body, version),
        API_KEY_OFFSET_FETCH => decode_as!(OffsetFetch, OffsetFetchRequest, body, version),
        API_KEY_FIND_COORDINATOR => {
            decode_as!(FindCoordinator, FindCoordinatorRequest, body, version)
        }
        API_KEY_JOIN_GROUP => decode_as!(JoinGroup, JoinGroupRequest, body, version),
        API_KEY_HEARTBEAT => decode_as!(Heartbeat, HeartbeatRequest, body, version),
        API_KEY_SYNC_GROUP => decode_as!(SyncGroup, SyncGroupRequest, body, version),
        API_KEY_LIST_GROUPS => decode_as!(ListGroups, ListGroupsRequest, body, version),
        API_KEY_API_VERSIONS => decode_as!(ApiVersions, ApiVersionsRequest, body, version),
        API_KEY_CREATE_TOPICS => decode_as!(CreateTopics, CreateTopicsRequest, body, version),
        other => return Err(KafkaError::UnsupportedApiKey(other)),
    };

    debug!(
        "Decoded {} v{} body",
        api_name(header.api_key),
        header.api_version
    );
    Ok(message)
}
