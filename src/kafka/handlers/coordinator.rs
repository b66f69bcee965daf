// Consumer group coordinator handlers
//
// Handlers for consumer group management APIs:
// FindCoordinator, JoinGroup, SyncGroup, Heartbeat, ListGroups
//
// Membership changes go through the group's balancer; these handlers only
// validate the request against the connection and translate outcomes into
// version-correct responses.

use kafka_protocol::messages::find_coordinator_request::FindCoordinatorRequest;
use kafka_protocol::messages::find_coordinator_response::FindCoordinatorResponse;
use kafka_protocol::messages::heartbeat_request::HeartbeatRequest;
use kafka_protocol::messages::heartbeat_response::HeartbeatResponse;
use kafka_protocol::messages::join_group_request::JoinGroupRequest;
use kafka_protocol::messages::join_group_response::{JoinGroupResponse, JoinGroupResponseMember};
use kafka_protocol::messages::list_groups_request::ListGroupsRequest;
use kafka_protocol::messages::list_groups_response::{ListGroupsResponse, ListedGroup};
use kafka_protocol::messages::sync_group_request::SyncGroupRequest;
use kafka_protocol::messages::sync_group_response::SyncGroupResponse;
use kafka_protocol::messages::{BrokerId, GroupId};
use tracing::{debug, warn};

use super::helpers::str_bytes;
use crate::kafka::constants::*;
use crate::kafka::coordinator::{generate_member_id, GroupState, JoinMember, SyncMember};
use crate::kafka::handler_context::HandlerContext;
use crate::kafka::response_builders::{
    build_find_coordinator_error_response, build_join_group_error_response,
    build_sync_group_error_response,
};

/// Handle FindCoordinator request
///
/// The broker that first sees a group becomes its coordinator.
pub fn handle_find_coordinator(
    ctx: &HandlerContext<'_>,
    request: FindCoordinatorRequest,
) -> FindCoordinatorResponse {
    let key = request.key.to_string();
    debug!(
        "FindCoordinator: key={}, key_type={}",
        key, request.key_type
    );

    if request.key_type != COORDINATOR_KEY_TYPE_GROUP {
        warn!("FindCoordinator key type {} is not supported", request.key_type);
        return build_find_coordinator_error_response(ERROR_UNKNOWN_SERVER_ERROR);
    }
    let Some(broker) = ctx.broker() else {
        warn!(
            "FindCoordinator on port {} which no broker serves",
            ctx.client.server_port
        );
        return build_find_coordinator_error_response(ERROR_UNKNOWN_SERVER_ERROR);
    };

    let group = ctx.store.get_or_create_group(&key, broker.id);
    let Some(coordinator) = group.coordinator().and_then(|id| ctx.store.broker(id)) else {
        return build_find_coordinator_error_response(ERROR_COORDINATOR_NOT_AVAILABLE);
    };

    let mut response = FindCoordinatorResponse::default();
    response.throttle_time_ms = 0;
    response.error_code = ERROR_NONE;
    response.node_id = BrokerId(coordinator.id);
    response.host = str_bytes(&coordinator.host);
    response.port = coordinator.port;
    response
}

/// Handle JoinGroup request
///
/// Suspends until the group's join window closes. The leader's response
/// carries every member with its metadata for the elected protocol.
pub async fn handle_join_group(
    ctx: &mut HandlerContext<'_>,
    request: JoinGroupRequest,
) -> JoinGroupResponse {
    let group_id = request.group_id.to_string();
    let Some(broker) = ctx.broker() else {
        return build_join_group_error_response(
            ERROR_UNKNOWN_SERVER_ERROR,
            request.member_id.as_str(),
            ctx.api_version,
        );
    };

    let group = ctx.store.get_or_create_group(&group_id, broker.id);
    let member_id = match ctx.client.member_id(&group_id) {
        Some(id) => id.to_string(),
        None => {
            let id = generate_member_id(&ctx.client.client_id);
            ctx.client.set_member_id(&group_id, id.clone());
            id
        }
    };

    debug!(
        "JoinGroup: group_id={}, member_id={}, client_id={}",
        group_id, member_id, ctx.client.client_id
    );

    let member = JoinMember {
        member_id: member_id.clone(),
        client_id: ctx.client.client_id.clone(),
        client_host: ctx.client.host.clone(),
        protocol_type: request.protocol_type.to_string(),
        protocols: request
            .protocols
            .into_iter()
            .map(|p| (p.name.to_string(), p.metadata))
            .collect(),
        session_timeout_ms: request.session_timeout_ms,
        rebalance_timeout_ms: request.rebalance_timeout_ms,
    };

    let outcome = group.join(member).await;
    if outcome.error_code != ERROR_NONE {
        return build_join_group_error_response(
            outcome.error_code,
            &outcome.member_id,
            ctx.api_version,
        );
    }

    let mut response = JoinGroupResponse::default();
    response.throttle_time_ms = 0;
    response.error_code = ERROR_NONE;
    response.generation_id = outcome.generation_id;
    if ctx.at_least(7) {
        response.protocol_type = Some(str_bytes(&outcome.protocol_type));
    }
    response.protocol_name = Some(str_bytes(&outcome.protocol_name));
    response.leader = str_bytes(&outcome.leader_id);
    response.member_id = str_bytes(&outcome.member_id);
    response.members = outcome
        .members
        .into_iter()
        .map(|(id, metadata)| {
            let mut member = JoinGroupResponseMember::default();
            member.member_id = str_bytes(&id);
            member.metadata = metadata;
            member
        })
        .collect();
    response
}

/// Handle SyncGroup request
///
/// The leader's request carries the assignments; everyone else waits for
/// it and receives their own assignment bytes unchanged.
pub async fn handle_sync_group(
    ctx: &HandlerContext<'_>,
    request: SyncGroupRequest,
) -> SyncGroupResponse {
    let group_id = request.group_id.to_string();
    debug!(
        "SyncGroup: group_id={}, member_id={}, generation_id={}, assignments={}",
        group_id,
        request.member_id.as_str(),
        request.generation_id,
        request.assignments.len()
    );

    if request.member_id.is_empty() {
        return build_sync_group_error_response(ERROR_MEMBER_ID_REQUIRED);
    }
    let Some(broker) = ctx.broker() else {
        return build_sync_group_error_response(ERROR_UNKNOWN_SERVER_ERROR);
    };
    let Some(group) = ctx.store.group(&group_id) else {
        return build_sync_group_error_response(ERROR_INVALID_GROUP_ID);
    };
    if group.coordinator() != Some(broker.id) {
        return build_sync_group_error_response(ERROR_NOT_COORDINATOR);
    }
    let Some(member_id) = ctx.client.member_id(&group_id) else {
        return build_sync_group_error_response(ERROR_REBALANCE_IN_PROGRESS);
    };

    let member = SyncMember {
        member_id: member_id.to_string(),
        generation_id: request.generation_id,
        assignments: request
            .assignments
            .into_iter()
            .map(|a| (a.member_id.to_string(), a.assignment))
            .collect(),
    };

    let outcome = group.sync(member).await;
    let mut response = build_sync_group_error_response(outcome.error_code);
    if outcome.error_code != ERROR_NONE {
        return response;
    }
    if ctx.at_least(5) {
        response.protocol_type = Some(str_bytes(&outcome.protocol_type));
        response.protocol_name = Some(str_bytes(&outcome.protocol_name));
    }
    response.assignment = outcome.assignment;
    response
}

/// Handle Heartbeat request
///
/// Heartbeats only report the group state; they never extend a session.
pub fn handle_heartbeat(ctx: &HandlerContext<'_>, request: HeartbeatRequest) -> HeartbeatResponse {
    let group_id = request.group_id.to_string();

    let error_code = if ctx.client.member_id(&group_id).is_none() {
        ERROR_UNKNOWN_MEMBER_ID
    } else {
        match ctx.store.group(&group_id) {
            None => ERROR_INVALID_GROUP_ID,
            Some(group) if group.state() != GroupState::Stable => ERROR_REBALANCE_IN_PROGRESS,
            Some(_) => ERROR_NONE,
        }
    };

    let mut response = HeartbeatResponse::default();
    response.throttle_time_ms = 0;
    response.error_code = error_code;
    response
}

/// Handle ListGroups request
///
/// An empty states filter matches every group.
pub fn handle_list_groups(
    ctx: &HandlerContext<'_>,
    request: ListGroupsRequest,
) -> ListGroupsResponse {
    let filter: Vec<String> = request
        .states_filter
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut response = ListGroupsResponse::default();
    response.throttle_time_ms = 0;
    response.error_code = ERROR_NONE;

    for group in ctx.store.groups() {
        let state = group.state_name();
        if !filter.is_empty() && !filter.iter().any(|s| s == state) {
            continue;
        }

        let mut listed = ListedGroup::default();
        listed.group_id = GroupId(str_bytes(&group.name));
        listed.protocol_type = group
            .generation()
            .map(|g| str_bytes(&g.protocol))
            .unwrap_or_else(|| str_bytes(""));
        if ctx.at_least(4) {
            listed.group_state = str_bytes(state);
        }
        response.groups.push(listed);
    }

    response
}
