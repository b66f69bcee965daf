//! Consumer protocol assignment
//!
//! The bytes a group leader hands out in SyncGroup. The coordinator never
//! interprets them beyond bookkeeping; members get the exact bytes back.
//!
//! ```text
//! version: i16
//! topics: i32 count, then per topic
//!   name: i16 length + UTF-8
//!   partitions: i32 count + i32 each
//! user_data: i32 length (-1 = null) + bytes
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::kafka::error::{KafkaError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberAssignment {
    pub version: i16,
    /// Topic -> partitions, in wire order
    pub topics: Vec<(String, Vec<i32>)>,
    pub user_data: Option<Bytes>,
}

impl MemberAssignment {
    pub fn new(topics: Vec<(String, Vec<i32>)>) -> Self {
        Self {
            topics,
            ..Default::default()
        }
    }

    pub fn partition_count(&self) -> usize {
        self.topics.iter().map(|(_, p)| p.len()).sum()
    }

    /// Parse assignment bytes; an empty buffer is an empty assignment
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }

        let mut buf = bytes;
        let version = read_i16(&mut buf, "version")?;
        let topic_count = read_i32(&mut buf, "topic count")?;
        if topic_count < 0 {
            return Err(KafkaError::corrupt(format!(
                "negative topic count {}",
                topic_count
            )));
        }

        let mut topics = Vec::with_capacity(topic_count.min(1024) as usize);
        for _ in 0..topic_count {
            let name = read_string(&mut buf)?;
            let partition_count = read_i32(&mut buf, "partition count")?;
            let mut partitions = Vec::new();
            for _ in 0..partition_count.max(0) {
                partitions.push(read_i32(&mut buf, "partition")?);
            }
            topics.push((name, partitions));
        }

        // Older clients omit user_data entirely
        let user_data = if buf.remaining() >= 4 {
            let len = buf.get_i32();
            if len < 0 {
                None
            } else if buf.remaining() >= len as usize {
                Some(Bytes::copy_from_slice(&buf[..len as usize]))
            } else {
                return Err(KafkaError::corrupt(format!(
                    "user data length {} exceeds remaining {} bytes",
                    len,
                    buf.remaining()
                )));
            }
        } else {
            None
        };

        Ok(Self {
            version,
            topics,
            user_data,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_i16(self.version);
        buf.put_i32(self.topics.len() as i32);
        for (name, partitions) in &self.topics {
            buf.put_i16(name.len() as i16);
            buf.put_slice(name.as_bytes());
            buf.put_i32(partitions.len() as i32);
            for partition in partitions {
                buf.put_i32(*partition);
            }
        }
        match &self.user_data {
            Some(data) => {
                buf.put_i32(data.len() as i32);
                buf.put_slice(data);
            }
            None => buf.put_i32(-1),
        }
        buf.freeze()
    }
}

fn read_i16(buf: &mut &[u8], what: &str) -> Result<i16> {
    if buf.remaining() < 2 {
        return Err(KafkaError::corrupt(format!("assignment truncated at {}", what)));
    }
    Ok(buf.get_i16())
}

fn read_i32(buf: &mut &[u8], what: &str) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(KafkaError::corrupt(format!("assignment truncated at {}", what)));
    }
    Ok(buf.get_i32())
}

fn read_string(buf: &mut &[u8]) -> Result<String> {
    let len = read_i16(buf, "topic name length")?;
    if len < 0 {
        return Ok(String::new());
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(KafkaError::corrupt(format!(
            "topic name length {} exceeds remaining {} bytes",
            len,
            buf.remaining()
        )));
    }
    let name = std::str::from_utf8(&buf[..len])
        .map_err(|e| KafkaError::corrupt(format!("topic name is not UTF-8: {}", e)))?
        .to_string();
    buf.advance(len);
    Ok(name)
}
