// Request dispatch
//
// Selects the handler for a decoded request by matching the message variant
// and wraps the handler's result in the matching response variant. Per-item
// failures are already folded into error codes by the handlers; an `Err`
// returned here is fatal for the connection.

use tracing::debug;

use crate::kafka::constants::api_name;
use crate::kafka::context::ClientContext;
use crate::kafka::error::Result;
use crate::kafka::handler_context::HandlerContext;
use crate::kafka::handlers;
use crate::kafka::messages::{KafkaRequest, RequestMessage, ResponseMessage};
use crate::kafka::store::Store;

/// Serve one request against `store`, returning the response body
pub async fn dispatch(
    store: &Store,
    client: &mut ClientContext,
    request: KafkaRequest,
) -> Result<ResponseMessage> {
    let KafkaRequest { header, message } = request;
    debug!(
        correlation_id = header.correlation_id,
        client_id = %client.client_id,
        "Dispatching {} v{}",
        api_name(header.api_key),
        header.api_version
    );

    let mut ctx = HandlerContext::new(store, client, header.api_version);
    let response = match message {
        RequestMessage::Produce(req) => {
            ResponseMessage::Produce(handlers::handle_produce(&ctx, req).await)
        }
        RequestMessage::Fetch(req) => {
            ResponseMessage::Fetch(handlers::handle_fetch(&ctx, req).await?)
        }
        RequestMessage::ListOffsets(req) => {
            ResponseMessage::ListOffsets(handlers::handle_list_offsets(&ctx, req))
        }
        RequestMessage::Metadata(req) => {
            ResponseMessage::Metadata(handlers::handle_metadata(&mut ctx, req))
        }
        RequestMessage::OffsetCommit(req) => {
            ResponseMessage::OffsetCommit(handlers::handle_offset_commit(&ctx, req))
        }
        RequestMessage::OffsetFetch(req) => {
            ResponseMessage::OffsetFetch(handlers::handle_offset_fetch(&ctx, req))
        }
        RequestMessage::FindCoordinator(req) => {
            ResponseMessage::FindCoordinator(handlers::handle_find_coordinator(&ctx, req))
        }
        RequestMessage::JoinGroup(req) => {
            ResponseMessage::JoinGroup(handlers::handle_join_group(&mut ctx, req).await)
        }
        RequestMessage::Heartbeat(req) => {
            ResponseMessage::Heartbeat(handlers::handle_heartbeat(&ctx, req))
        }
        RequestMessage::SyncGroup(req) => {
            ResponseMessage::SyncGroup(handlers::handle_sync_group(&ctx, req).await)
        }
        RequestMessage::ListGroups(req) => {
            ResponseMessage::ListGroups(handlers::handle_list_groups(&ctx, req))
        }
        RequestMessage::ApiVersions(_) => {
            ResponseMessage::ApiVersions(handlers::handle_api_versions())
        }
        RequestMessage::CreateTopics(req) => {
            ResponseMessage::CreateTopics(handlers::handle_create_topics(&ctx, req))
        }
    };
    Ok(response)
}
