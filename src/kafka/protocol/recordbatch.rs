// RecordBatch codec
//
// Produce requests carry RecordBatch v2 (Kafka 0.11+) or, from old clients,
// a legacy MessageSet v0/v1. Fetch responses are written in the format the
// fetch version implies: magic 0 for Fetch v0-1, magic 1 for v2-3 and
// RecordBatch v2 from v4 on.

use bytes::{Buf, Bytes, BytesMut};
use kafka_protocol::protocol::StrBytes;
use kafka_protocol::records::{
    Compression, Record as WireRecord, RecordBatchDecoder, RecordBatchEncoder,
    RecordEncodeOptions, TimestampType,
};
use tracing::{debug, warn};

use super::super::error::{KafkaError, Result};
use super::super::messages::{Record, RecordHeader};

/// Parse the records of a produced batch
///
/// Offsets in the batch are ignored; the partition assigns its own. A
/// missing timestamp (-1) is left as 0 so the partition stamps it.
pub fn parse_record_batch(batch_bytes: &Bytes) -> Result<Vec<Record>> {
    if batch_bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut batch_buf = batch_bytes.clone();
    match RecordBatchDecoder::decode(&mut batch_buf) {
        Ok(record_set) => Ok(record_set
            .records
            .into_iter()
            .map(|record| Record {
                offset: 0,
                time: record.timestamp.max(0),
                key: record.key,
                value: record.value,
                headers: record
                    .headers
                    .into_iter()
                    .map(|(key, value)| RecordHeader {
                        key: key.to_string(),
                        value,
                    })
                    .collect(),
            })
            .collect()),
        Err(e) => {
            debug!(
                "RecordBatch decode failed ({}), trying MessageSet v0/v1 format",
                e
            );
            parse_message_set_legacy(batch_bytes, e)
        }
    }
}

/// Parse legacy MessageSet v0/v1
///
/// ```text
/// repeated: offset i64, message_size i32, message
/// message:  crc u32, magic i8, attributes i8, [timestamp i64 if magic 1], key bytes, value bytes
/// ```
fn parse_message_set_legacy(
    batch_bytes: &Bytes,
    original_error: impl std::fmt::Display,
) -> Result<Vec<Record>> {
    let mut buf = batch_bytes.clone();
    let mut records = Vec::new();

    while buf.remaining() >= 12 {
        let _offset = buf.get_i64();
        let message_size = buf.get_i32();
        if message_size < 0 || buf.remaining() < message_size as usize {
            // Brokers may truncate the last message of a set
            debug!("Stopping at partial message of {} bytes", message_size);
            break;
        }

        let mut message = buf.split_to(message_size as usize);
        if message.remaining() < 6 {
            warn!("MessageSet entry too short: {} bytes", message_size);
            break;
        }
        let _crc = message.get_u32();
        let magic = message.get_i8();
        let _attributes = message.get_i8();

        let time = if magic >= 1 {
            if message.remaining() < 8 {
                warn!("MessageSet entry missing timestamp");
                break;
            }
            message.get_i64().max(0)
        } else {
            0
        };

        let Some(key) = read_nullable_bytes(&mut message) else {
            warn!("Insufficient bytes for key");
            break;
        };
        let Some(value) = read_nullable_bytes(&mut message) else {
            warn!("Insufficient bytes for value");
            break;
        };

        records.push(Record {
            offset: 0,
            time,
            key,
            value,
            headers: Vec::new(),
        });
    }

    if records.is_empty() {
        Err(KafkaError::corrupt(format!(
            "Failed to parse as both RecordBatch and MessageSet: {}",
            original_error
        )))
    } else {
        debug!("Parsed {} records from MessageSet format", records.len());
        Ok(records)
    }
}

/// `None` when the buffer is too short, `Some(None)` for a null field
fn read_nullable_bytes(buf: &mut Bytes) -> Option<Option<Bytes>> {
    if buf.remaining() < 4 {
        return None;
    }
    let len = buf.get_i32();
    if len < 0 {
        return Some(None);
    }
    if buf.remaining() < len as usize {
        return None;
    }
    Some(Some(buf.split_to(len as usize)))
}

/// Message format version written for a Fetch response version
pub fn record_format_for_fetch(fetch_version: i16) -> i8 {
    match fetch_version {
        0 | 1 => 0,
        2 | 3 => 1,
        _ => 2,
    }
}

/// Encode log records for a Fetch response
pub fn encode_records(records: &[Record], fetch_version: i16) -> Result<Bytes> {
    if records.is_empty() {
        return Ok(Bytes::new());
    }

    let wire_records: Vec<WireRecord> = records
        .iter()
        .map(|record| WireRecord {
            transactional: false,
            control: false,
            partition_leader_epoch: 0,
            producer_id: -1,
            producer_epoch: -1,
            timestamp_type: TimestampType::Creation,
            offset: record.offset,
            sequence: record.offset as i32,
            timestamp: record.time,
            key: record.key.clone(),
            value: record.value.clone(),
            headers: record
                .headers
                .iter()
                .map(|h| (StrBytes::from_string(h.key.clone()), h.value.clone()))
                .collect(),
        })
        .collect();

    let mut encoded = BytesMut::new();
    RecordBatchEncoder::encode(
        &mut encoded,
        wire_records.iter(),
        &RecordEncodeOptions {
            version: record_format_for_fetch(fetch_version),
            compression: Compression::None,
        },
    )?;
    Ok(encoded.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn record(offset: i64, key: &'static str, value: &'static str) -> Record {
        Record {
            offset,
            time: 1_700_000_000_000,
            key: Some(Bytes::from_static(key.as_bytes())),
            value: Some(Bytes::from_static(value.as_bytes())),
            headers: vec![RecordHeader {
                key: "trace".into(),
                value: Some(Bytes::from_static(b"abc")),
            }],
        }
    }

    #[test]
    fn test_empty_batch() {
        assert!(parse_record_batch(&Bytes::new()).unwrap().is_empty());
        assert!(encode_records(&[], 11).unwrap().is_empty());
    }

    #[test]
    fn test_v2_batch_keeps_content() {
        let records = vec![record(3, "foo", "bar"), record(4, "k", "v")];
        let encoded = encode_records(&records, 11).unwrap();
        assert_eq!(encoded[16], 2, "magic byte");

        let parsed = parse_record_batch(&encoded).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].key, records[0].key);
        assert_eq!(parsed[1].value, records[1].value);
        assert_eq!(parsed[0].time, records[0].time);
        assert_eq!(parsed[0].headers, records[0].headers);
    }

    #[test]
    fn test_record_format_for_fetch() {
        assert_eq!(record_format_for_fetch(0), 0);
        assert_eq!(record_format_for_fetch(1), 0);
        assert_eq!(record_format_for_fetch(3), 1);
        assert_eq!(record_format_for_fetch(4), 2);
        assert_eq!(record_format_for_fetch(11), 2);
    }

    #[test]
    fn test_legacy_message_set_v1() {
        let mut message = BytesMut::new();
        message.put_u32(0); // crc
        message.put_i8(1); // magic
        message.put_i8(0); // attributes
        message.put_i64(42); // timestamp
        message.put_i32(-1); // null key
        message.put_i32(3);
        message.put_slice(b"bar");

        let mut set = BytesMut::new();
        set.put_i64(0);
        set.put_i32(message.len() as i32);
        set.put_slice(&message);

        let records = parse_message_set_legacy(&set.freeze(), "test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, 42);
        assert!(records[0].key.is_none());
        assert_eq!(records[0].value.as_deref(), Some(&b"bar"[..]));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = parse_record_batch(&Bytes::from_static(b"not a batch")).unwrap_err();
        assert_eq!(
            err.to_kafka_error_code(),
            crate::kafka::constants::ERROR_CORRUPT_MESSAGE
        );
    }
}
