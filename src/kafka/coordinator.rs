//! Consumer group coordinator
//!
//! Group membership is in memory only and lives for the life of the
//! process. Each group runs its own balancer task (see [`balancer`]) that
//! serializes joins and syncs:
//!
//! - **Stable**: initial state, and the state after the leader's sync
//! - **Joining**: collecting JoinGroups until the join window closes
//! - **AwaitingSync**: generation chosen, waiting for the leader's assignments

pub mod assignment;
mod balancer;
pub mod group;

pub use assignment::MemberAssignment;
pub use group::{
    Generation, Group, GroupState, JoinMember, JoinOutcome, Member, SyncMember, SyncOutcome,
};

/// Member id handed out on a connection's first JoinGroup for a group
pub fn generate_member_id(client_id: &str) -> String {
    let client_id = if client_id.is_empty() {
        "consumer"
    } else {
        client_id
    };
    format!("{}-{}", client_id, uuid::Uuid::new_v4())
}
