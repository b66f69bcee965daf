// In-memory log storage
//
// Store -> Topic -> Partition -> Segment. Partitions own their segments
// behind a per-partition lock; topics hand out shared partition handles so
// request handlers never hold a store lock while they wait.

pub mod partition;
pub mod segment;
pub mod topic;

use std::time::{SystemTime, UNIX_EPOCH};

pub use partition::{Partition, RetentionPolicy};
pub use segment::Segment;
pub use topic::{validate_topic_name, Topic};

/// Milliseconds since the Unix epoch
pub fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
