// Partition log
//
// An append-only, segmented log. Offsets are dense: every appended record
// gets `tail` and bumps it by one. Retention drops whole closed segments from
// the front of the log and moves `head` forward; it never moves back.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::segment::Segment;
use super::unix_millis;
use crate::kafka::error::{KafkaError, Result};
use crate::kafka::messages::Record;
use crate::kafka::validator::PayloadValidator;

/// Resolved log settings for one partition at retention time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Closed segments older than this are deleted; negative disables
    pub retention_ms: i64,
    /// Closed segments are purged once the log reaches this size; negative disables
    pub retention_bytes: i64,
    /// The active segment is rolled after this long; negative disables
    pub segment_ms: i64,
}

#[derive(Debug, Default)]
struct PartitionLog {
    segments: BTreeMap<i64, Segment>,
    active_segment: i64,
    head: i64,
    tail: i64,
}

impl PartitionLog {
    fn active_mut(&mut self, now: SystemTime) -> &mut Segment {
        let usable = self
            .segments
            .get(&self.active_segment)
            .is_some_and(Segment::is_active);
        if !usable {
            self.active_segment = self.tail;
        }
        let tail = self.tail;
        self.segments
            .entry(self.active_segment)
            .or_insert_with(|| Segment::new(tail, now))
    }

    fn remove_segment(&mut self, key: i64) -> bool {
        match self.segments.remove(&key) {
            Some(segment) => {
                self.head = self.head.max(segment.tail);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct Replicas {
    leader: i32,
    ids: Vec<i32>,
}

#[derive(Debug)]
pub struct Partition {
    /// Name of the owning topic
    pub topic: String,
    pub index: i32,
    replicas: RwLock<Replicas>,
    log: RwLock<PartitionLog>,
}

impl Partition {
    /// Create an empty partition led by the first replica
    pub fn new(topic: impl Into<String>, index: i32, replicas: Vec<i32>) -> Self {
        Self {
            topic: topic.into(),
            index,
            replicas: RwLock::new(Replicas {
                leader: replicas.first().copied().unwrap_or(-1),
                ids: replicas,
            }),
            log: RwLock::new(PartitionLog::default()),
        }
    }

    /// Broker id of the leader, -1 when no broker serves the partition
    pub fn leader(&self) -> i32 {
        self.replicas.read().leader
    }

    pub fn replicas(&self) -> Vec<i32> {
        self.replicas.read().ids.clone()
    }

    pub(crate) fn add_replica(&self, broker_id: i32) {
        let mut replicas = self.replicas.write();
        if !replicas.ids.contains(&broker_id) {
            replicas.ids.push(broker_id);
        }
        if replicas.leader < 0 {
            replicas.leader = broker_id;
        }
    }

    pub(crate) fn remove_replica(&self, broker_id: i32) {
        let mut replicas = self.replicas.write();
        replicas.ids.retain(|id| *id != broker_id);
        if replicas.leader == broker_id {
            replicas.leader = replicas.ids.first().copied().unwrap_or(-1);
        }
    }

    /// Earliest retained offset
    pub fn start_offset(&self) -> i64 {
        self.log.read().head
    }

    /// Next offset to be assigned (the high watermark)
    pub fn offset(&self) -> i64 {
        self.log.read().tail
    }

    /// Total bytes currently retained
    pub fn size(&self) -> usize {
        self.log.read().segments.values().map(|s| s.size).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.log.read().segments.len()
    }

    /// Append a batch, returning the offset assigned to its first record
    ///
    /// Every record value is checked before anything is written; one
    /// rejected record rejects the whole batch. `on_append` sees each record
    /// after it received its offset.
    pub fn write<F>(
        &self,
        batch: Vec<Record>,
        validator: Option<&dyn PayloadValidator>,
        now: SystemTime,
        mut on_append: F,
    ) -> Result<i64>
    where
        F: FnMut(&Record),
    {
        if let Some(validator) = validator {
            for record in &batch {
                validator.validate(record.value.as_deref())?;
            }
        }

        let now_ms = unix_millis(now);
        let mut log = self.log.write();
        let base_offset = log.tail;

        for mut record in batch {
            record.offset = log.tail;
            if record.time == 0 {
                record.time = now_ms;
            }

            let segment = log.active_mut(now);
            segment.append(record, now);
            if let Some(appended) = segment.log.last() {
                on_append(appended);
            }
            log.tail += 1;
        }

        Ok(base_offset)
    }

    /// Read records starting at `offset`
    ///
    /// The first record is always returned; later records are added while the
    /// running size stays within `max_bytes`. Reading at or past the tail
    /// yields an empty batch.
    pub fn read(&self, offset: i64, max_bytes: i32) -> Result<Vec<Record>> {
        let log = self.log.read();

        if offset < log.head {
            return Err(KafkaError::OffsetOutOfRange {
                offset,
                start: log.head,
            });
        }
        if offset >= log.tail {
            return Ok(Vec::new());
        }

        let start_key = match log.segments.range(..=offset).next_back() {
            Some((key, segment)) if segment.contains(offset) => *key,
            _ => return Ok(Vec::new()),
        };

        let max_bytes = max_bytes.max(0) as usize;
        let mut records: Vec<Record> = Vec::new();
        let mut size = 0usize;
        let (mut base_offset, mut base_time) = (0, 0);

        for segment in log.segments.range(start_key..).map(|(_, s)| s) {
            let skip = (offset - segment.head).max(0) as usize;
            for record in segment.log.iter().skip(skip) {
                if records.is_empty() {
                    base_offset = record.offset;
                    base_time = record.time;
                }
                let record_size = record.size(base_offset, base_time);
                if !records.is_empty() && size + record_size > max_bytes {
                    return Ok(records);
                }
                size += record_size;
                records.push(record.clone());
            }
        }

        Ok(records)
    }

    /// Close the active segment once it is older than `segment_ms`
    ///
    /// An empty active segment is not closed; its clock restarts instead.
    pub fn roll(&self, now: SystemTime, segment_ms: i64) -> bool {
        if segment_ms < 0 {
            return false;
        }
        let mut log = self.log.write();
        let tail = log.tail;
        let active_key = log.active_segment;
        let Some(active) = log.segments.get_mut(&active_key) else {
            return false;
        };
        if !active.is_active() || active.opened + Duration::from_millis(segment_ms as u64) >= now {
            return false;
        }
        if active.is_empty() {
            active.opened = now;
            return false;
        }

        active.close(now);
        log.active_segment = tail;
        log.segments.insert(tail, Segment::new(tail, now));
        debug!(topic = %self.topic, partition = self.index, "Rolled segment at offset {}", tail);
        true
    }

    /// Delete closed segments past retention, returning how many were dropped
    pub fn apply_retention(&self, now: SystemTime, policy: &RetentionPolicy) -> usize {
        let mut log = self.log.write();
        let mut deleted = 0;

        if policy.retention_ms >= 0 {
            let retention = Duration::from_millis(policy.retention_ms as u64);
            let expired: Vec<i64> = log
                .segments
                .values()
                .filter(|s| s.size > 0)
                .filter(|s| s.closed.is_some_and(|closed| now > closed + retention))
                .map(|s| s.head)
                .collect();
            for key in expired {
                if log.remove_segment(key) {
                    deleted += 1;
                }
            }
        }

        if policy.retention_bytes >= 0 {
            let total: usize = log.segments.values().map(|s| s.size).sum();
            if total as i64 >= policy.retention_bytes {
                let closed: Vec<i64> = log
                    .segments
                    .values()
                    .filter(|s| !s.is_active())
                    .map(|s| s.head)
                    .collect();
                for key in closed {
                    if log.remove_segment(key) {
                        deleted += 1;
                    }
                }
            }
        }

        if deleted > 0 {
            info!(
                topic = %self.topic,
                partition = self.index,
                "Deleted {} segment(s), log now starts at {}",
                deleted,
                log.head
            );
        }
        deleted
    }

    /// One retention pass: roll, then delete
    pub fn retention_tick(&self, now: SystemTime, policy: &RetentionPolicy) {
        self.roll(now, policy.segment_ms);
        self.apply_retention(now, policy);
    }

    /// Drop every segment and the records they hold
    pub fn delete(&self) {
        let mut log = self.log.write();
        log.segments.clear();
        log.head = log.tail;
        log.active_segment = log.tail;
    }
}
