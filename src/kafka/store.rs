//! Cluster store
//!
//! The single aggregate root of a mock cluster: brokers, topics and consumer
//! groups behind one readers-writer lock. Request handlers take the read side;
//! configuration reconciliation and group creation take the write side.
//! Partition logs and group state machines carry their own synchronisation,
//! so no store lock is ever held across an await point.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use super::broker::{Broker, BrokerInfo, RetentionTicker};
use super::cluster_config::{ChannelConfig, ClusterConfig};
use super::constants::{DEFAULT_FETCH_POLL_INTERVAL_MS, DEFAULT_JOIN_WINDOW_MS};
use super::context::ClientContext;
use super::coordinator::Group;
use super::dispatch;
use super::error::{KafkaError, Result};
use super::messages::{KafkaRequest, KafkaResponse, Record};
use super::metrics;
use super::observer::{EventTraits, LogObserver, RecordObserver};
use super::pending_fetches::PendingFetchRegistry;
use super::storage::{Partition, Topic};
use crate::config::Config;

/// Tunables that are not part of the cluster document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a rebalance collects JoinGroup requests
    pub join_window: Duration,
    /// Fallback poll period of a waiting fetch
    pub fetch_poll_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            join_window: Duration::from_millis(DEFAULT_JOIN_WINDOW_MS),
            fetch_poll_interval: Duration::from_millis(DEFAULT_FETCH_POLL_INTERVAL_MS),
        }
    }
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            join_window: Duration::from_millis(config.join_window_ms),
            fetch_poll_interval: Duration::from_millis(config.fetch_poll_interval_ms),
        }
    }
}

#[derive(Default)]
struct StoreState {
    cluster: String,
    brokers: BTreeMap<i32, Broker>,
    topics: IndexMap<String, Arc<Topic>>,
    /// Topics owned by the cluster document; CreateTopics topics are not
    configured: HashSet<String>,
    groups: IndexMap<String, Arc<Group>>,
}

struct Shared {
    state: RwLock<StoreState>,
    options: StoreOptions,
    pending_fetches: PendingFetchRegistry,
    observer: RwLock<Arc<dyn RecordObserver>>,
}

/// Handle to a mock cluster; clones share the same cluster
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("Store")
            .field("cluster", &state.cluster)
            .field("brokers", &state.brokers.len())
            .field("topics", &state.topics.len())
            .field("groups", &state.groups.len())
            .finish()
    }
}

impl Store {
    pub fn new(config: &ClusterConfig) -> Self {
        Self::with_options(config, StoreOptions::default())
    }

    pub fn with_options(config: &ClusterConfig, options: StoreOptions) -> Self {
        let store = Self {
            shared: Arc::new(Shared {
                state: RwLock::new(StoreState::default()),
                options,
                pending_fetches: PendingFetchRegistry::new(),
                observer: RwLock::new(Arc::new(LogObserver)),
            }),
        };
        store.update(config);
        store
    }

    pub fn options(&self) -> StoreOptions {
        self.shared.options
    }

    /// Replace the observer notified on every appended record
    pub fn set_observer(&self, observer: Arc<dyn RecordObserver>) {
        *self.shared.observer.write() = observer;
    }

    pub fn pending_fetches(&self) -> &PendingFetchRegistry {
        &self.shared.pending_fetches
    }

    /// Reconcile the cluster against a (new) cluster document
    ///
    /// Best effort: a server with an unusable URL or a channel with an
    /// illegal name is logged and skipped, the rest is applied.
    pub fn update(&self, config: &ClusterConfig) {
        let mut state = self.shared.state.write();
        if state.cluster != config.info.name {
            info!(cluster = %config.info.name, "Cluster name set");
            state.cluster = config.info.name.clone();
        }

        self.reconcile_brokers(&mut state, config);
        reconcile_topics(&mut state, config);

        for topic in state.topics.values() {
            sync_replicas(topic, &state.brokers);
        }
    }

    fn reconcile_brokers(&self, state: &mut StoreState, config: &ClusterConfig) {
        let removed: Vec<i32> = state
            .brokers
            .values()
            .filter(|b| !config.servers.contains_key(&b.name))
            .map(|b| b.id)
            .collect();

        for id in removed {
            let Some(mut broker) = state.brokers.remove(&id) else {
                continue;
            };
            broker.set_ticker(None);
            for topic in state.topics.values() {
                for partition in topic.partitions() {
                    partition.remove_replica(id);
                }
            }
            for group in state.groups.values() {
                group.release_coordinator(id);
            }
            info!(broker = %broker.name, id, "Removed broker");
        }

        for (name, server) in &config.servers {
            let existing = state.brokers.values().find(|b| &b.name == name).map(|b| b.id);
            let id = existing.unwrap_or_else(|| next_broker_id(&state.brokers));
            let configured = match Broker::from_config(id, name, server) {
                Ok(broker) => broker,
                Err(e) => {
                    error!(broker = %name, "Skipping broker: {}", e);
                    continue;
                }
            };

            match state.brokers.get_mut(&id) {
                Some(broker) => {
                    let interval_changed =
                        broker.retention_check_interval() != configured.retention_check_interval();
                    if broker.host != configured.host || broker.port != configured.port {
                        info!(broker = %name, id, "Broker moved to {}", configured.addr());
                        broker.host = configured.host;
                        broker.port = configured.port;
                    }
                    broker.bindings = configured.bindings;
                    if interval_changed || !broker.has_ticker() {
                        let ticker = self.spawn_ticker(broker);
                        broker.set_ticker(ticker);
                    }
                }
                None => {
                    let mut broker = configured;
                    let ticker = self.spawn_ticker(&broker);
                    broker.set_ticker(ticker);
                    info!(broker = %name, id, addr = %broker.addr(), "Added broker");
                    state.brokers.insert(id, broker);
                }
            }
        }
    }

    fn spawn_ticker(&self, broker: &Broker) -> Option<RetentionTicker> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let broker_id = broker.id;
        RetentionTicker::spawn(&broker.name, broker.retention_check_interval(), move || {
            match shared.upgrade() {
                Some(shared) => {
                    Store { shared }.retention_tick(broker_id, SystemTime::now());
                    true
                }
                None => false,
            }
        })
    }

    /// Roll and clean every partition led by `broker_id`
    pub fn retention_tick(&self, broker_id: i32, now: SystemTime) {
        let (bindings, topics) = {
            let state = self.shared.state.read();
            let Some(broker) = state.brokers.get(&broker_id) else {
                return;
            };
            let topics: Vec<Arc<Topic>> = state.topics.values().cloned().collect();
            (broker.bindings.clone(), topics)
        };

        for topic in topics {
            let policy = topic.retention_policy(&bindings);
            for partition in topic.partitions() {
                if partition.leader() == broker_id {
                    partition.retention_tick(now, &policy);
                }
            }
        }
    }

    /// Stop every retention ticker and group balancer
    pub fn close(&self) {
        let mut state = self.shared.state.write();
        for broker in state.brokers.values_mut() {
            broker.set_ticker(None);
        }
        for group in state.groups.values() {
            group.stop();
        }
        debug!(cluster = %state.cluster, "Store closed");
    }

    pub fn cluster_name(&self) -> String {
        self.shared.state.read().cluster.clone()
    }

    /// Brokers ordered by id
    pub fn brokers(&self) -> Vec<BrokerInfo> {
        self.shared.state.read().brokers.values().map(Broker::info).collect()
    }

    pub fn broker(&self, id: i32) -> Option<BrokerInfo> {
        self.shared.state.read().brokers.get(&id).map(Broker::info)
    }

    /// The broker whose listener accepted a connection on `port`
    pub fn broker_by_port(&self, port: i32) -> Option<BrokerInfo> {
        self.shared
            .state
            .read()
            .brokers
            .values()
            .find(|b| b.port == port)
            .map(Broker::info)
    }

    pub fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.shared.state.read().topics.get(name).cloned()
    }

    /// Topics in creation order
    pub fn topics(&self) -> Vec<Arc<Topic>> {
        self.shared.state.read().topics.values().cloned().collect()
    }

    /// Create a topic outside the cluster document (CreateTopics)
    pub fn add_topic(&self, name: &str, channel: &ChannelConfig) -> Result<Arc<Topic>> {
        let mut state = self.shared.state.write();
        if state.topics.contains_key(name) {
            return Err(KafkaError::TopicAlreadyExists(name.to_string()));
        }

        let replicas = visible_brokers(&state.brokers, &channel.servers);
        let topic = Arc::new(Topic::new(name, channel, &replicas)?);
        state.topics.insert(name.to_string(), topic.clone());
        info!(
            topic = %name,
            partitions = topic.partition_count(),
            "Created topic"
        );
        Ok(topic)
    }

    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.shared.state.read().groups.get(name).cloned()
    }

    pub fn groups(&self) -> Vec<Arc<Group>> {
        self.shared.state.read().groups.values().cloned().collect()
    }

    /// Look up a group, creating it with `coordinator` when absent
    pub fn get_or_create_group(&self, name: &str, coordinator: i32) -> Arc<Group> {
        if let Some(group) = self.group(name) {
            return group;
        }

        let mut state = self.shared.state.write();
        if let Some(group) = state.groups.get(name) {
            return group.clone();
        }
        let group = Arc::new(Group::new(name, coordinator, self.shared.options.join_window));
        state.groups.insert(name.to_string(), group.clone());
        info!(group = %name, coordinator, "Created consumer group");
        group
    }

    /// Append a batch to a partition and wake fetches waiting on it
    pub async fn append(
        &self,
        topic: &Topic,
        partition: &Partition,
        batch: Vec<Record>,
    ) -> Result<i64> {
        let cluster = self.cluster_name();
        let traits = EventTraits::new(cluster.as_str(), topic.name.as_str(), partition.index);
        let observer = self.shared.observer.read().clone();
        let validator = topic.validator();
        let count = batch.len();
        let appended_at = SystemTime::now();

        let base_offset = partition.write(batch, validator.as_deref(), appended_at, |record| {
            observer.on_record(record, partition.index, &traits);
            metrics::record_message(&cluster, &topic.name, appended_at);
        })?;

        if count > 0 {
            let high_watermark = partition.offset();
            self.shared
                .pending_fetches
                .notify_new_data(&topic.name, partition.index, high_watermark)
                .await;
            for group in self.groups() {
                if let Some(committed) = group.committed(&topic.name, partition.index) {
                    metrics::record_lag(
                        &cluster,
                        &group.name,
                        &topic.name,
                        partition.index,
                        high_watermark - committed,
                    );
                }
            }
        }

        Ok(base_offset)
    }

    /// Store a committed offset and refresh the group's lag
    pub fn commit(&self, group: &Group, topic: &str, partition: &Partition, offset: i64) {
        group.commit(topic, partition.index, offset);
        metrics::record_lag(
            &self.cluster_name(),
            &group.name,
            topic,
            partition.index,
            partition.offset() - offset,
        );
    }

    /// Answer one request on `response_tx`
    ///
    /// A closed response channel means the peer is gone; the response is
    /// dropped without error.
    pub async fn serve(
        &self,
        response_tx: &UnboundedSender<KafkaResponse>,
        request: KafkaRequest,
        client: &mut ClientContext,
    ) -> Result<()> {
        if let Some(client_id) = &request.header.client_id {
            client.client_id = client_id.clone();
        }

        let header = request.header.clone();
        let message = dispatch::dispatch(self, client, request).await?;
        if response_tx.send(KafkaResponse::new(&header, message)).is_err() {
            debug!(
                correlation_id = header.correlation_id,
                "Connection closed before response was sent"
            );
        }
        Ok(())
    }
}

fn reconcile_topics(state: &mut StoreState, config: &ClusterConfig) {
    let removed: Vec<String> = state
        .configured
        .iter()
        .filter(|name| !config.channels.contains_key(name.as_str()))
        .cloned()
        .collect();

    for name in removed {
        state.configured.remove(&name);
        if let Some(topic) = state.topics.shift_remove(&name) {
            topic.delete();
            info!(topic = %name, "Removed topic");
        }
    }

    for (name, channel) in &config.channels {
        if let Some(topic) = state.topics.get(name) {
            topic.configure(channel);
            let replicas = visible_brokers(&state.brokers, &channel.servers);
            topic.resize(channel.partition_count(), &replicas);
            state.configured.insert(name.clone());
            continue;
        }

        let replicas = visible_brokers(&state.brokers, &channel.servers);
        match Topic::new(name, channel, &replicas) {
            Ok(topic) => {
                info!(
                    topic = %name,
                    partitions = topic.partition_count(),
                    "Added topic"
                );
                state.topics.insert(name.clone(), Arc::new(topic));
                state.configured.insert(name.clone());
            }
            Err(e) => error!(topic = %name, "Skipping topic: {}", e),
        }
    }
}

/// Make every partition's replica list match the brokers the topic is visible on
fn sync_replicas(topic: &Topic, brokers: &BTreeMap<i32, Broker>) {
    for partition in topic.partitions() {
        for broker in brokers.values() {
            if topic.is_visible_to(&broker.name) {
                partition.add_replica(broker.id);
            } else {
                partition.remove_replica(broker.id);
            }
        }
    }
}

fn visible_brokers(brokers: &BTreeMap<i32, Broker>, servers: &[String]) -> Vec<i32> {
    brokers
        .values()
        .filter(|b| servers.is_empty() || servers.iter().any(|s| s == &b.name))
        .map(|b| b.id)
        .collect()
}

/// Smallest id not taken by a live broker
fn next_broker_id(brokers: &BTreeMap<i32, Broker>) -> i32 {
    (0..)
        .find(|id| !brokers.contains_key(id))
        .unwrap_or(brokers.len() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mockall::predicate::{always, eq};
    use serde_json::json;

    use crate::kafka::cluster_config::{MessageConfig, OperationConfig};
    use crate::kafka::observer::MockRecordObserver;
    use crate::kafka::metrics::LAST_MESSAGE_TIMESTAMP;
    use crate::testing::GaugeCapture;

    fn record(value: &'static str) -> Record {
        Record::new(None, Some(Bytes::from_static(value.as_bytes())))
    }

    fn two_brokers() -> ClusterConfig {
        ClusterConfig::new("test")
            .with_server("a", "localhost:9092")
            .with_server("b", "kafka://127.0.0.1:19092")
    }

    #[tokio::test]
    async fn test_append_reports_wall_clock_timestamp() {
        let recorder = GaugeCapture::new(LAST_MESSAGE_TIMESTAMP);
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let config = two_brokers().with_channel("foo", ChannelConfig::default());
        let store = Store::new(&config);
        let topic = store.topic("foo").unwrap();
        let partition = topic.partition(0).unwrap();

        let mut stale = record("a");
        stale.time = 42_000;
        let before = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        store.append(&topic, &partition, vec![stale]).await.unwrap();

        assert!(recorder.value() >= before);
        assert_eq!(partition.read(0, i32::MAX).unwrap()[0].time, 42_000);
        store.close();
    }

    #[tokio::test]
    async fn test_brokers_get_dense_ids() {
        let store = Store::new(&two_brokers());
        let brokers = store.brokers();
        assert_eq!(brokers.len(), 2);
        assert_eq!((brokers[0].id, brokers[0].name.as_str()), (0, "a"));
        assert_eq!((brokers[1].id, brokers[1].port), (1, 19092));
        store.close();
    }

    #[tokio::test]
    async fn test_removed_broker_id_is_reused() {
        let store = Store::new(&two_brokers());
        store.update(&ClusterConfig::new("test").with_server("b", "127.0.0.1:19092"));
        assert_eq!(store.brokers().len(), 1);
        assert!(store.broker(0).is_none());

        let config = ClusterConfig::new("test")
            .with_server("b", "127.0.0.1:19092")
            .with_server("c", "localhost:29092");
        store.update(&config);
        let c = store.broker_by_port(29092).unwrap();
        assert_eq!((c.id, c.name.as_str()), (0, "c"));
        store.close();
    }

    #[tokio::test]
    async fn test_broker_updated_in_place() {
        let store = Store::new(&two_brokers());
        let config = ClusterConfig::new("test")
            .with_server("a", "localhost:9093")
            .with_server("b", "kafka://127.0.0.1:19092");
        store.update(&config);
        let a = store.broker(0).unwrap();
        assert_eq!((a.name.as_str(), a.port), ("a", 9093));
        store.close();
    }

    #[tokio::test]
    async fn test_bad_broker_url_is_skipped() {
        let config = ClusterConfig::new("test")
            .with_server("good", "localhost:9092")
            .with_server("bad", "kafka://:9093");
        let store = Store::new(&config);
        let brokers = store.brokers();
        assert_eq!(brokers.len(), 1);
        assert_eq!(brokers[0].name, "good");
        store.close();
    }

    #[tokio::test]
    async fn test_topic_reconcile() {
        let config = two_brokers()
            .with_channel("foo", ChannelConfig::with_partitions(3))
            .with_channel("bar", ChannelConfig::default());
        let store = Store::new(&config);
        assert_eq!(store.topic("foo").unwrap().partition_count(), 3);
        let first = store.topic("foo").unwrap().partition(0).unwrap();
        assert_eq!(first.replicas(), vec![0, 1]);

        let config = two_brokers().with_channel("foo", ChannelConfig::with_partitions(1));
        store.update(&config);
        assert_eq!(store.topic("foo").unwrap().partition_count(), 1);
        assert!(store.topic("bar").is_none());

        let config = two_brokers().with_channel("foo", ChannelConfig::with_partitions(4));
        store.update(&config);
        assert_eq!(store.topic("foo").unwrap().partition_count(), 4);
        store.close();
    }

    #[tokio::test]
    async fn test_invalid_channel_name_is_skipped() {
        let config = two_brokers()
            .with_channel("event?", ChannelConfig::default())
            .with_channel("event", ChannelConfig::default());
        let store = Store::new(&config);
        let names: Vec<String> = store.topics().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["event".to_string()]);
        store.close();
    }

    #[tokio::test]
    async fn test_created_topic_survives_update() {
        let store = Store::new(&two_brokers());
        store.add_topic("created", &ChannelConfig::with_partitions(2)).unwrap();
        let err = store.add_topic("created", &ChannelConfig::default()).unwrap_err();
        assert!(matches!(err, KafkaError::TopicAlreadyExists(_)));

        store.update(&two_brokers());
        assert!(store.topic("created").is_some());
        store.close();
    }

    #[tokio::test]
    async fn test_server_filter_limits_replicas() {
        let mut channel = ChannelConfig::default();
        channel.servers = vec!["b".to_string()];
        let store = Store::new(&two_brokers().with_channel("foo", channel));
        let partition = store.topic("foo").unwrap().partition(0).unwrap();
        assert_eq!(partition.replicas(), vec![1]);
        assert_eq!(partition.leader(), 1);

        let mut channel = ChannelConfig::default();
        channel.servers = vec!["b".to_string()];
        let config = ClusterConfig::new("test")
            .with_server("a", "localhost:9092")
            .with_channel("foo", channel);
        store.update(&config);
        assert!(partition.replicas().is_empty());
        assert_eq!(partition.leader(), -1);
        store.close();
    }

    #[tokio::test]
    async fn test_append_notifies_observer() {
        let store = Store::new(&two_brokers().with_channel("foo", ChannelConfig::default()));
        let mut observer = MockRecordObserver::new();
        observer
            .expect_on_record()
            .with(always(), eq(0), always())
            .times(2)
            .returning(|record, _, traits| {
                assert_eq!(traits.cluster, "test");
                assert_eq!(traits.topic, "foo");
                assert!(record.time > 0);
            });
        store.set_observer(Arc::new(observer));

        let topic = store.topic("foo").unwrap();
        let partition = topic.partition(0).unwrap();
        let base = store
            .append(&topic, &partition, vec![record("a"), record("b")])
            .await
            .unwrap();
        assert_eq!(base, 0);
        assert_eq!(partition.offset(), 2);
        store.close();
    }

    #[tokio::test]
    async fn test_append_rejected_by_schema() {
        let mut channel = ChannelConfig::default();
        channel.publish = Some(OperationConfig {
            message: Some(MessageConfig {
                content_type: Some("application/json".to_string()),
                payload: Some(json!({"type": "integer"})),
            }),
        });
        let store = Store::new(&two_brokers().with_channel("foo", channel));
        let topic = store.topic("foo").unwrap();
        let partition = topic.partition(0).unwrap();

        let err = store
            .append(&topic, &partition, vec![record("12"), record("\"x\"")])
            .await
            .unwrap_err();
        assert!(matches!(err, KafkaError::Validation { .. }));
        assert_eq!(partition.offset(), 0);
        store.close();
    }

    #[tokio::test]
    async fn test_groups_created_once() {
        let store = Store::new(&two_brokers());
        let first = store.get_or_create_group("g", 1);
        let second = store.get_or_create_group("g", 0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.coordinator(), Some(1));
        assert_eq!(store.groups().len(), 1);
        store.close();
    }

    #[tokio::test]
    async fn test_removing_broker_releases_coordinator() {
        let store = Store::new(&two_brokers());
        let group = store.get_or_create_group("g", 1);
        store.update(&ClusterConfig::new("test").with_server("a", "localhost:9092"));
        assert_eq!(group.coordinator(), None);
        store.close();
    }

    #[tokio::test]
    async fn test_retention_tick_cleans_led_partitions() {
        let mut config = two_brokers();
        config.servers["a"].bindings.kafka.log_retention_bytes = Some(1);
        config.servers["a"].bindings.kafka.log_segment_ms = Some(10);
        let store = Store::new(&config.with_channel("foo", ChannelConfig::default()));
        let topic = store.topic("foo").unwrap();
        let partition = topic.partition(0).unwrap();
        assert_eq!(partition.leader(), 0);

        store.append(&topic, &partition, vec![record("a")]).await.unwrap();
        let later = SystemTime::now() + Duration::from_secs(60);
        // broker b leads nothing
        store.retention_tick(1, later);
        assert_eq!(partition.start_offset(), 0);

        store.retention_tick(0, later);
        assert_eq!(partition.start_offset(), 1);
        assert_eq!(partition.offset(), 1);
        store.close();
    }

    #[tokio::test]
    async fn test_commit_overwrites() {
        let store = Store::new(&two_brokers().with_channel("foo", ChannelConfig::default()));
        let topic = store.topic("foo").unwrap();
        let partition = topic.partition(0).unwrap();
        let group = store.get_or_create_group("g", 0);
        store.commit(&group, "foo", &partition, 0);
        store.commit(&group, "foo", &partition, 0);
        assert_eq!(group.committed("foo", 0), Some(0));
        store.close();
    }
}
