//! Consumer group
//!
//! Group state and generation are written only by the group's balancer
//! task. Everything else reads snapshots. Offset commits live beside the
//! state machine and are written directly by the OffsetCommit handler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::oneshot;

use super::balancer::{Balancer, JoinEvent, SyncEvent};
use crate::kafka::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Stable,
    Joining,
    AwaitingSync,
}

/// One member of a generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    /// Metadata the member advertised for the elected protocol
    pub metadata: Bytes,
    /// Assignment bytes from the leader, echoed back verbatim
    pub assignment: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub id: i32,
    pub protocol_type: String,
    /// Elected partition assignment protocol
    pub protocol: String,
    pub leader_id: String,
    pub members: IndexMap<String, Member>,
}

#[derive(Debug)]
pub(crate) struct GroupStatus {
    pub(crate) state: GroupState,
    pub(crate) generation: Option<Generation>,
}

/// What a member sends when joining
#[derive(Debug, Clone, Default)]
pub struct JoinMember {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,
    pub protocol_type: String,
    /// Advertised assignment protocols with their metadata, in preference order
    pub protocols: Vec<(String, Bytes)>,
    pub session_timeout_ms: i32,
    pub rebalance_timeout_ms: i32,
}

/// Reply to a join once the collection window closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    pub error_code: i16,
    pub generation_id: i32,
    pub protocol_type: String,
    pub protocol_name: String,
    pub leader_id: String,
    pub member_id: String,
    /// Every member with its metadata; only filled for the leader
    pub members: Vec<(String, Bytes)>,
}

impl JoinOutcome {
    pub fn error(error_code: i16, member_id: &str) -> Self {
        Self {
            error_code,
            generation_id: -1,
            member_id: member_id.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncMember {
    pub member_id: String,
    pub generation_id: i32,
    /// Member id -> assignment bytes; only the leader sends these
    pub assignments: Vec<(String, Bytes)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub error_code: i16,
    pub protocol_type: String,
    pub protocol_name: String,
    pub assignment: Bytes,
}

impl SyncOutcome {
    pub fn error(error_code: i16) -> Self {
        Self {
            error_code,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct Group {
    pub name: String,
    coordinator: RwLock<Option<i32>>,
    status: Arc<RwLock<GroupStatus>>,
    commits: RwLock<BTreeMap<(String, i32), i64>>,
    balancer: Balancer,
}

impl Group {
    /// Create a group coordinated by `coordinator` and start its balancer
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(name: impl Into<String>, coordinator: i32, join_window: Duration) -> Self {
        let name = name.into();
        let status = Arc::new(RwLock::new(GroupStatus {
            state: GroupState::Stable,
            generation: None,
        }));
        let balancer = Balancer::spawn(&name, status.clone(), join_window);
        Self {
            name,
            coordinator: RwLock::new(Some(coordinator)),
            status,
            commits: RwLock::new(BTreeMap::new()),
            balancer,
        }
    }

    /// Broker id of the coordinator, if it is still configured
    pub fn coordinator(&self) -> Option<i32> {
        *self.coordinator.read()
    }

    /// Forget the coordinator once its broker is removed
    pub(crate) fn release_coordinator(&self, broker_id: i32) {
        let mut coordinator = self.coordinator.write();
        if *coordinator == Some(broker_id) {
            *coordinator = None;
        }
    }

    pub fn state(&self) -> GroupState {
        self.status.read().state
    }

    pub fn generation(&self) -> Option<Generation> {
        self.status.read().generation.clone()
    }

    /// State name reported by ListGroups
    pub fn state_name(&self) -> &'static str {
        let status = self.status.read();
        match &status.generation {
            None => GROUP_STATE_EMPTY,
            Some(generation) if generation.members.is_empty() => GROUP_STATE_EMPTY,
            Some(_) => match status.state {
                GroupState::Joining => GROUP_STATE_PREPARING_REBALANCE,
                GroupState::AwaitingSync => GROUP_STATE_COMPLETING_REBALANCE,
                GroupState::Stable => GROUP_STATE_STABLE,
            },
        }
    }

    /// Queue a join and wait for the rebalance to finish collecting members
    pub async fn join(&self, member: JoinMember) -> JoinOutcome {
        let member_id = member.member_id.clone();
        let (reply, rx) = oneshot::channel();
        if !self.balancer.join(JoinEvent { member, reply }) {
            return JoinOutcome::error(ERROR_COORDINATOR_NOT_AVAILABLE, &member_id);
        }
        rx.await
            .unwrap_or_else(|_| JoinOutcome::error(ERROR_COORDINATOR_NOT_AVAILABLE, &member_id))
    }

    /// Queue a sync and wait for this member's assignment
    pub async fn sync(&self, member: SyncMember) -> SyncOutcome {
        let (reply, rx) = oneshot::channel();
        if !self.balancer.sync(SyncEvent { member, reply }) {
            return SyncOutcome::error(ERROR_COORDINATOR_NOT_AVAILABLE);
        }
        rx.await
            .unwrap_or_else(|_| SyncOutcome::error(ERROR_COORDINATOR_NOT_AVAILABLE))
    }

    /// Record a committed offset, replacing any earlier commit
    pub fn commit(&self, topic: &str, partition: i32, offset: i64) {
        self.commits
            .write()
            .insert((topic.to_string(), partition), offset);
    }

    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.commits
            .read()
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Every commit as (topic, partition, offset), sorted by topic then partition
    pub fn commits(&self) -> Vec<(String, i32, i64)> {
        self.commits
            .read()
            .iter()
            .map(|((topic, partition), offset)| (topic.clone(), *partition, *offset))
            .collect()
    }

    /// Stop the balancer; waiting joins and syncs are answered with an error
    pub fn stop(&self) {
        self.balancer.stop();
    }
}
