// Log segment
//
// A contiguous offset range of a partition log. Segments are the unit of
// retention: a closed segment is dropped as a whole.

use std::time::SystemTime;

use crate::kafka::messages::Record;

#[derive(Debug, Clone)]
pub struct Segment {
    /// First offset in the segment (inclusive)
    pub head: i64,
    /// Next offset (exclusive)
    pub tail: i64,
    pub log: Vec<Record>,
    /// Sum of the encoded record sizes
    pub size: usize,
    pub opened: SystemTime,
    /// `None` while this is the active segment
    pub closed: Option<SystemTime>,
    pub last_written: SystemTime,
}

impl Segment {
    pub fn new(offset: i64, now: SystemTime) -> Self {
        Self {
            head: offset,
            tail: offset,
            log: Vec::new(),
            size: 0,
            opened: now,
            closed: None,
            last_written: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.closed.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// True when `offset` falls inside `[head, tail)`
    pub fn contains(&self, offset: i64) -> bool {
        self.head <= offset && offset < self.tail
    }

    /// Append a record that already carries its offset
    pub fn append(&mut self, record: Record, now: SystemTime) {
        debug_assert_eq!(record.offset, self.tail);
        self.size += record.standalone_size();
        self.tail = record.offset + 1;
        self.last_written = now;
        self.log.push(record);
    }

    pub fn close(&mut self, now: SystemTime) {
        self.closed = Some(now);
    }
}
