//! Group balancer
//!
//! One task per group consumes join and sync events and is the only writer
//! of the group's state and generation.
//!
//! ```text
//! Stable --join--> Joining --window closes--> AwaitingSync --leader sync--> Stable
//!                     ^                            |
//!                     +----------join--------------+
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::assignment::MemberAssignment;
use super::group::{
    Generation, GroupState, GroupStatus, JoinMember, JoinOutcome, Member, SyncMember,
    SyncOutcome,
};
use crate::kafka::constants::*;

pub(crate) struct JoinEvent {
    pub(crate) member: JoinMember,
    pub(crate) reply: oneshot::Sender<JoinOutcome>,
}

pub(crate) struct SyncEvent {
    pub(crate) member: SyncMember,
    pub(crate) reply: oneshot::Sender<SyncOutcome>,
}

/// Sending half of a group's balancer task
#[derive(Debug)]
pub(crate) struct Balancer {
    join_tx: mpsc::UnboundedSender<JoinEvent>,
    sync_tx: mpsc::UnboundedSender<SyncEvent>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Balancer {
    pub(crate) fn spawn(group: &str, status: Arc<RwLock<GroupStatus>>, window: Duration) -> Self {
        let (join_tx, join_rx) = mpsc::unbounded_channel();
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let event_loop = BalancerLoop {
            group: group.to_string(),
            status,
            window,
            joins: Vec::new(),
            deadline: None,
            syncs: Vec::new(),
        };
        tokio::spawn(event_loop.run(join_rx, sync_rx, stop_rx));

        Self {
            join_tx,
            sync_tx,
            stop_tx: Mutex::new(Some(stop_tx)),
        }
    }

    /// False once the task has ended
    pub(crate) fn join(&self, event: JoinEvent) -> bool {
        self.join_tx.send(event).is_ok()
    }

    pub(crate) fn sync(&self, event: SyncEvent) -> bool {
        self.sync_tx.send(event).is_ok()
    }

    pub(crate) fn stop(&self) {
        if let Some(stop) = self.stop_tx.lock().take() {
            let _ = stop.send(());
        }
    }
}

struct BalancerLoop {
    group: String,
    status: Arc<RwLock<GroupStatus>>,
    window: Duration,
    joins: Vec<JoinEvent>,
    /// When the current collection window closes
    deadline: Option<Instant>,
    syncs: Vec<SyncEvent>,
}

impl BalancerLoop {
    async fn run(
        mut self,
        mut join_rx: mpsc::UnboundedReceiver<JoinEvent>,
        mut sync_rx: mpsc::UnboundedReceiver<SyncEvent>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        loop {
            let deadline = self.deadline;
            let window_closed = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = &mut stop_rx => break,
                Some(event) = join_rx.recv() => self.on_join(event),
                Some(event) = sync_rx.recv() => self.on_sync(event),
                _ = window_closed => self.finish_join(),
                else => break,
            }
        }
        debug!(group = %self.group, "Balancer stopped");
    }

    fn set_state(&self, state: GroupState) {
        self.status.write().state = state;
        debug!(group = %self.group, "Group is now {:?}", state);
    }

    fn on_join(&mut self, event: JoinEvent) {
        let member = &event.member;
        debug!(
            group = %self.group,
            member = %member.member_id,
            client = %member.client_id,
            host = %member.client_host,
            session_timeout_ms = member.session_timeout_ms,
            rebalance_timeout_ms = member.rebalance_timeout_ms,
            "Join request"
        );
        let state = self.status.read().state;
        match state {
            GroupState::Joining => {
                self.joins.retain(|j| j.member.member_id != event.member.member_id);
                self.joins.push(event);
            }
            GroupState::Stable | GroupState::AwaitingSync => {
                for pending in self.syncs.drain(..) {
                    let _ = pending
                        .reply
                        .send(SyncOutcome::error(ERROR_REBALANCE_IN_PROGRESS));
                }
                self.joins = vec![event];
                self.deadline = Some(Instant::now() + self.window);
                self.set_state(GroupState::Joining);
            }
        }
    }

    fn finish_join(&mut self) {
        self.deadline = None;
        let joins = std::mem::take(&mut self.joins);
        let Some(leader) = joins.first() else {
            self.set_state(GroupState::Stable);
            return;
        };

        let protocol = elect_protocol(joins.iter().map(|j| &j.member));
        let leader_id = leader.member.member_id.clone();
        let protocol_type = leader.member.protocol_type.clone();

        let members: IndexMap<String, Member> = joins
            .iter()
            .map(|j| {
                let metadata = j
                    .member
                    .protocols
                    .iter()
                    .find(|(name, _)| *name == protocol)
                    .map(|(_, metadata)| metadata.clone())
                    .unwrap_or_default();
                let member = Member {
                    id: j.member.member_id.clone(),
                    metadata,
                    assignment: Bytes::new(),
                };
                (member.id.clone(), member)
            })
            .collect();

        let generation_id = {
            let mut status = self.status.write();
            let id = status.generation.as_ref().map_or(0, |g| g.id + 1);
            status.generation = Some(Generation {
                id,
                protocol_type: protocol_type.clone(),
                protocol: protocol.clone(),
                leader_id: leader_id.clone(),
                members: members.clone(),
            });
            status.state = GroupState::AwaitingSync;
            id
        };
        debug!(
            group = %self.group,
            generation = generation_id,
            protocol = %protocol,
            leader = %leader_id,
            "Collected {} member(s), awaiting sync",
            members.len()
        );

        for join in joins {
            let member_id = join.member.member_id;
            let member_list = if member_id == leader_id {
                members
                    .values()
                    .map(|m| (m.id.clone(), m.metadata.clone()))
                    .collect()
            } else {
                Vec::new()
            };
            let _ = join.reply.send(JoinOutcome {
                error_code: ERROR_NONE,
                generation_id,
                protocol_type: protocol_type.clone(),
                protocol_name: protocol.clone(),
                leader_id: leader_id.clone(),
                member_id,
                members: member_list,
            });
        }
    }

    fn on_sync(&mut self, event: SyncEvent) {
        let status = self.status.read();
        let state = status.state;
        let check = match (&status.generation, state) {
            (_, GroupState::Joining) => Err(ERROR_REBALANCE_IN_PROGRESS),
            (None, _) => Err(ERROR_ILLEGAL_GENERATION),
            (Some(g), _) if g.id != event.member.generation_id => Err(ERROR_ILLEGAL_GENERATION),
            (Some(g), _) if !g.members.contains_key(&event.member.member_id) => {
                Err(ERROR_UNKNOWN_MEMBER_ID)
            }
            (Some(g), _) => Ok(g.leader_id == event.member.member_id),
        };
        drop(status);

        let is_leader = match check {
            Ok(is_leader) => is_leader,
            Err(code) => {
                let _ = event.reply.send(SyncOutcome::error(code));
                return;
            }
        };

        match state {
            GroupState::AwaitingSync if is_leader || !event.member.assignments.is_empty() => {
                self.complete_sync(&event.member.assignments);
                let mut waiting = std::mem::take(&mut self.syncs);
                waiting.push(event);
                for pending in waiting {
                    let outcome = self.assignment_for(&pending.member.member_id);
                    let _ = pending.reply.send(outcome);
                }
            }
            GroupState::AwaitingSync => self.syncs.push(event),
            _ => {
                let outcome = self.assignment_for(&event.member.member_id);
                let _ = event.reply.send(outcome);
            }
        }
    }

    fn complete_sync(&self, assignments: &[(String, Bytes)]) {
        let mut status = self.status.write();
        if let Some(generation) = status.generation.as_mut() {
            for (member_id, bytes) in assignments {
                let Some(member) = generation.members.get_mut(member_id) else {
                    warn!(
                        group = %self.group,
                        member = %member_id,
                        "Assignment for unknown member"
                    );
                    continue;
                };
                match MemberAssignment::parse(bytes) {
                    Ok(parsed) => debug!(
                        group = %self.group,
                        member = %member_id,
                        topics = parsed.topics.len(),
                        "Assigned {} partition(s)",
                        parsed.partition_count()
                    ),
                    Err(e) => warn!(
                        group = %self.group,
                        member = %member_id,
                        "Unreadable assignment: {}", e
                    ),
                }
                member.assignment = bytes.clone();
            }
        }
        status.state = GroupState::Stable;
        debug!(group = %self.group, "Group is now {:?}", GroupState::Stable);
    }

    fn assignment_for(&self, member_id: &str) -> SyncOutcome {
        let status = self.status.read();
        match &status.generation {
            Some(generation) => SyncOutcome {
                error_code: ERROR_NONE,
                protocol_type: generation.protocol_type.clone(),
                protocol_name: generation.protocol.clone(),
                assignment: generation
                    .members
                    .get(member_id)
                    .map(|m| m.assignment.clone())
                    .unwrap_or_default(),
            },
            None => SyncOutcome::error(ERROR_ILLEGAL_GENERATION),
        }
    }
}

/// Pick the protocol advertised by the most members
///
/// Ties go to the name seen first.
fn elect_protocol<'a>(members: impl Iterator<Item = &'a JoinMember>) -> String {
    let mut votes: IndexMap<&str, i32> = IndexMap::new();
    for member in members {
        for (name, _) in &member.protocols {
            *votes.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    let mut elected = ("", -1);
    for (name, count) in votes {
        if count > elected.1 {
            elected = (name, count);
        }
    }
    elected.0.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::coordinator::Group;

    fn joiner(member_id: &str, protocols: &[&str]) -> JoinMember {
        JoinMember {
            member_id: member_id.into(),
            client_id: member_id.into(),
            protocol_type: "consumer".into(),
            protocols: protocols
                .iter()
                .map(|p| (p.to_string(), Bytes::from(format!("{member_id}-{p}"))))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_elect_protocol_by_votes() {
        let members = [
            joiner("a", &["range", "roundrobin"]),
            joiner("b", &["roundrobin"]),
        ];
        assert_eq!(elect_protocol(members.iter()), "roundrobin");
    }

    #[test]
    fn test_elect_protocol_tie_goes_to_first_seen() {
        let members = [joiner("a", &["range"]), joiner("b", &["sticky"])];
        assert_eq!(elect_protocol(members.iter()), "range");
        assert_eq!(elect_protocol(std::iter::empty::<&JoinMember>()), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_member_rebalance() {
        let group = Arc::new(Group::new("g", 0, Duration::from_millis(3000)));

        let join = group.join(joiner("a", &["range"])).await;
        assert_eq!(join.error_code, ERROR_NONE);
        assert_eq!(join.generation_id, 0);
        assert_eq!(join.leader_id, "a");
        assert_eq!(join.protocol_name, "range");
        assert_eq!(join.members, vec![("a".to_string(), Bytes::from("a-range"))]);
        assert_eq!(group.state(), GroupState::AwaitingSync);

        let sync = group
            .sync(SyncMember {
                member_id: "a".into(),
                generation_id: 0,
                assignments: vec![("a".into(), Bytes::from_static(b"assigned"))],
            })
            .await;
        assert_eq!(sync.error_code, ERROR_NONE);
        assert_eq!(sync.assignment, Bytes::from_static(b"assigned"));
        assert_eq!(group.state(), GroupState::Stable);
        assert_eq!(group.state_name(), GROUP_STATE_STABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follower_sync_waits_for_leader() {
        let group = Arc::new(Group::new("g", 0, Duration::from_millis(3000)));

        let g = group.clone();
        let leader = tokio::spawn(async move { g.join(joiner("a", &["range"])).await });
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let follower = group.join(joiner("b", &["range"])).await;
        let leader = leader.await.unwrap();

        assert_eq!(leader.leader_id, "a");
        assert_eq!(follower.leader_id, "a");
        assert_eq!(leader.members.len(), 2);
        assert!(follower.members.is_empty());

        let g = group.clone();
        let follower_sync = tokio::spawn(async move {
            g.sync(SyncMember {
                member_id: "b".into(),
                generation_id: 0,
                assignments: vec![],
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(group.state(), GroupState::AwaitingSync);

        let leader_sync = group
            .sync(SyncMember {
                member_id: "a".into(),
                generation_id: 0,
                assignments: vec![
                    ("a".into(), Bytes::from_static(b"one")),
                    ("b".into(), Bytes::from_static(b"two")),
                ],
            })
            .await;
        assert_eq!(leader_sync.assignment, Bytes::from_static(b"one"));
        assert_eq!(
            follower_sync.await.unwrap().assignment,
            Bytes::from_static(b"two")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_while_joining_is_rejected() {
        let group = Arc::new(Group::new("g", 0, Duration::from_millis(3000)));

        let g = group.clone();
        let join = tokio::spawn(async move { g.join(joiner("a", &["range"])).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(group.state(), GroupState::Joining);

        let sync = group
            .sync(SyncMember {
                member_id: "a".into(),
                generation_id: 0,
                assignments: vec![],
            })
            .await;
        assert_eq!(sync.error_code, ERROR_REBALANCE_IN_PROGRESS);
        assert_eq!(group.state(), GroupState::Joining);

        let join = join.await.unwrap();
        assert_eq!(join.error_code, ERROR_NONE);
        assert_eq!(group.state(), GroupState::AwaitingSync);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_during_awaiting_sync_restarts_rebalance() {
        let window = Duration::from_millis(100);
        let group = Arc::new(Group::new("g", 0, window));

        let g = group.clone();
        let leader = tokio::spawn(async move { g.join(joiner("a", &["range"])).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = group.join(joiner("b", &["range"])).await;
        assert_eq!(leader.await.unwrap().generation_id, 0);
        assert_eq!(follower.leader_id, "a");

        let g = group.clone();
        let follower_sync = tokio::spawn(async move {
            g.sync(SyncMember {
                member_id: "b".into(),
                generation_id: 0,
                assignments: vec![],
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(group.state(), GroupState::AwaitingSync);

        let started = Instant::now();
        let g = group.clone();
        let newcomer = tokio::spawn(async move { g.join(joiner("c", &["range"])).await });

        let queued = follower_sync.await.unwrap();
        assert_eq!(queued.error_code, ERROR_REBALANCE_IN_PROGRESS);
        assert_eq!(group.state(), GroupState::Joining);

        let newcomer = newcomer.await.unwrap();
        assert!(started.elapsed() >= window);
        assert_eq!(newcomer.error_code, ERROR_NONE);
        assert_eq!(newcomer.generation_id, 1);
        assert_eq!(newcomer.leader_id, "c");
        assert_eq!(newcomer.members.len(), 1);
        assert_eq!(group.state(), GroupState::AwaitingSync);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_with_wrong_generation() {
        let group = Group::new("g", 0, Duration::from_millis(100));
        let sync = group
            .sync(SyncMember {
                member_id: "a".into(),
                generation_id: 0,
                assignments: vec![],
            })
            .await;
        assert_eq!(sync.error_code, ERROR_ILLEGAL_GENERATION);

        group.join(joiner("a", &["range"])).await;
        let sync = group
            .sync(SyncMember {
                member_id: "a".into(),
                generation_id: 4,
                assignments: vec![],
            })
            .await;
        assert_eq!(sync.error_code, ERROR_ILLEGAL_GENERATION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_increments_per_rebalance() {
        let group = Group::new("g", 0, Duration::from_millis(100));
        assert_eq!(group.join(joiner("a", &["range"])).await.generation_id, 0);
        assert_eq!(group.join(joiner("a", &["range"])).await.generation_id, 1);
        assert_eq!(group.generation().unwrap().id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_sync_returns_known_assignment() {
        let group = Group::new("g", 0, Duration::from_millis(100));
        group.join(joiner("a", &["range"])).await;
        group
            .sync(SyncMember {
                member_id: "a".into(),
                generation_id: 0,
                assignments: vec![("a".into(), Bytes::from_static(b"x"))],
            })
            .await;

        let again = group
            .sync(SyncMember {
                member_id: "a".into(),
                generation_id: 0,
                assignments: vec![],
            })
            .await;
        assert_eq!(again.assignment, Bytes::from_static(b"x"));
        assert_eq!(again.protocol_name, "range");
    }
}
