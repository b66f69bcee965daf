//! Test helper functions
//!
//! Store fixtures and request builders shared by the handler tests, plus a
//! metrics recorder that captures one gauge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use kafka_protocol::messages::fetch_request::{FetchPartition, FetchRequest, FetchTopic};
use kafka_protocol::messages::join_group_request::{JoinGroupRequest, JoinGroupRequestProtocol};
use kafka_protocol::messages::produce_request::{
    PartitionProduceData, ProduceRequest, TopicProduceData,
};
use kafka_protocol::messages::sync_group_request::{SyncGroupRequest, SyncGroupRequestAssignment};
use kafka_protocol::messages::GroupId;
use kafka_protocol::protocol::StrBytes;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};

use crate::kafka::cluster_config::{ChannelConfig, ClusterConfig};
use crate::kafka::context::ClientContext;
use crate::kafka::messages::Record;
use crate::kafka::protocol::{encode_records, parse_record_batch};
use crate::kafka::store::{Store, StoreOptions};

/// Port of the single broker in [`cluster`]
pub const TEST_PORT: i32 = 9092;

/// One broker named "broker" on localhost:9092 plus the given topics
pub fn cluster(topics: &[(&str, i32)]) -> ClusterConfig {
    topics.iter().fold(
        ClusterConfig::new("test").with_server("broker", "localhost:9092"),
        |config, (name, partitions)| {
            config.with_channel(*name, ChannelConfig::with_partitions(*partitions))
        },
    )
}

/// Store over [`cluster`] with a short join window
///
/// Must be called within a Tokio runtime.
pub fn test_store(topics: &[(&str, i32)]) -> Store {
    Store::with_options(
        &cluster(topics),
        StoreOptions {
            join_window: std::time::Duration::from_millis(200),
            ..StoreOptions::default()
        },
    )
}

/// A client connected to the test broker
pub fn test_client(client_id: &str) -> ClientContext {
    let mut client = ClientContext::new("127.0.0.1", TEST_PORT);
    client.client_id = client_id.to_string();
    client
}

/// Encode key/value pairs as a v2 record batch
pub fn record_batch(records: &[(&str, &str)]) -> Bytes {
    let records: Vec<Record> = records
        .iter()
        .enumerate()
        .map(|(i, (key, value))| Record {
            offset: i as i64,
            time: 1_700_000_000_000,
            ..Record::new(
                Some(Bytes::copy_from_slice(key.as_bytes())),
                Some(Bytes::copy_from_slice(value.as_bytes())),
            )
        })
        .collect();
    encode_records(&records, 11).expect("encode record batch")
}

/// Decode the records of a Fetch response partition
pub fn fetched_records(records: &Option<Bytes>) -> Vec<Record> {
    match records {
        Some(bytes) if !bytes.is_empty() => parse_record_batch(bytes).expect("decode records"),
        _ => Vec::new(),
    }
}

pub fn produce_request(topic: &str, partition: i32, records: &[(&str, &str)]) -> ProduceRequest {
    let mut partition_data = PartitionProduceData::default();
    partition_data.index = partition;
    partition_data.records = Some(record_batch(records));

    let mut topic_data = TopicProduceData::default();
    topic_data.name = crate::kafka::handlers::topic_name(topic);
    topic_data.partition_data = vec![partition_data];

    let mut request = ProduceRequest::default();
    request.acks = 1;
    request.timeout_ms = 1000;
    request.topic_data = vec![topic_data];
    request
}

pub fn fetch_request(topic: &str, partition: i32, offset: i64, max_bytes: i32) -> FetchRequest {
    let mut fetch_partition = FetchPartition::default();
    fetch_partition.partition = partition;
    fetch_partition.fetch_offset = offset;
    fetch_partition.partition_max_bytes = max_bytes;

    let mut fetch_topic = FetchTopic::default();
    fetch_topic.topic = crate::kafka::handlers::topic_name(topic);
    fetch_topic.partitions = vec![fetch_partition];

    let mut request = FetchRequest::default();
    request.max_wait_ms = 0;
    request.min_bytes = 0;
    request.max_bytes = i32::MAX;
    request.topics = vec![fetch_topic];
    request
}

pub fn join_request(group: &str, protocol: &str, metadata: &'static [u8]) -> JoinGroupRequest {
    let mut join_protocol = JoinGroupRequestProtocol::default();
    join_protocol.name = StrBytes::from_string(protocol.to_string());
    join_protocol.metadata = Bytes::from_static(metadata);

    let mut request = JoinGroupRequest::default();
    request.group_id = GroupId(StrBytes::from_string(group.to_string()));
    request.session_timeout_ms = 30_000;
    request.rebalance_timeout_ms = 30_000;
    request.member_id = StrBytes::from_static_str("");
    request.protocol_type = StrBytes::from_static_str("consumer");
    request.protocols = vec![join_protocol];
    request
}

pub fn sync_request(
    group: &str,
    member_id: &str,
    generation_id: i32,
    assignments: Vec<(String, Bytes)>,
) -> SyncGroupRequest {
    let mut request = SyncGroupRequest::default();
    request.group_id = GroupId(StrBytes::from_string(group.to_string()));
    request.member_id = StrBytes::from_string(member_id.to_string());
    request.generation_id = generation_id;
    request.assignments = assignments
        .into_iter()
        .map(|(member_id, assignment)| {
            let mut entry = SyncGroupRequestAssignment::default();
            entry.member_id = StrBytes::from_string(member_id);
            entry.assignment = assignment;
            entry
        })
        .collect();
    request
}

/// Recorder keeping the last value set on the gauge called `name`
pub struct GaugeCapture {
    name: &'static str,
    value: Arc<AtomicU64>,
}

impl GaugeCapture {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

impl Recorder for GaugeCapture {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        if key.name() == self.name {
            Gauge::from_arc(self.value.clone())
        } else {
            Gauge::noop()
        }
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
