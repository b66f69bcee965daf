// Response encoding
//
// Every response is [ResponseHeader][ResponseBody]; the header version
// follows the API's flexible-version threshold and the body is encoded at
// the version recorded on the response.

use bytes::BytesMut;
use kafka_protocol::messages::ResponseHeader;
use kafka_protocol::protocol::Encodable;

use super::super::constants;
use super::super::error::Result;
use super::super::messages::{KafkaResponse, ResponseMessage};

/// Encode header and body for one response variant
macro_rules! encode_standard_response {
    ($buf:expr, $corr_id:expr, $api_ver:expr, $api_key:expr, $body:expr) => {{
        let header = ResponseHeader::default().with_correlation_id($corr_id);
        let header_version = constants::get_response_header_version($api_key, $api_ver);
        header.encode($buf, header_version)?;
        $body.encode($buf, $api_ver)?;
    }};
}

/// Encode a response without the length prefix (the codec adds it)
pub fn encode_response(response: &KafkaResponse) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    let correlation_id = response.correlation_id;
    let version = response.api_version;
    let api_key = response.api_key();

    match &response.message {
        ResponseMessage::Produce(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::Fetch(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::ListOffsets(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::Metadata(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::OffsetCommit(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::OffsetFetch(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::FindCoordinator(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::JoinGroup(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::Heartbeat(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::SyncGroup(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::ListGroups(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::ApiVersions(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
        ResponseMessage::CreateTopics(body) => {
            encode_standard_response!(&mut buf, correlation_id, version, api_key, body)
        }
    }

    Ok(buf)
}
