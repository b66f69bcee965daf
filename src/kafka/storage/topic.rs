// Topic
//
// A named, ordered set of partitions plus the settings taken from its
// channel: visibility filter, retention overrides and payload validator.
// Settings are swapped wholesale on every configuration update.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::partition::{Partition, RetentionPolicy};
use crate::kafka::cluster_config::{BrokerBindings, ChannelConfig, TopicBindings};
use crate::kafka::constants::MAX_TOPIC_NAME_LENGTH;
use crate::kafka::error::{KafkaError, Result};
use crate::kafka::validator::{self, PayloadValidator};

/// Check a topic name against Kafka's naming rules
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KafkaError::InvalidTopic("topic name is empty".into()));
    }
    if name == "." || name == ".." {
        return Err(KafkaError::InvalidTopic(format!(
            "topic name cannot be '{}'",
            name
        )));
    }
    if name.len() > MAX_TOPIC_NAME_LENGTH {
        return Err(KafkaError::InvalidTopic(format!(
            "topic name is longer than {} characters",
            MAX_TOPIC_NAME_LENGTH
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(KafkaError::InvalidTopic(format!(
            "topic name '{}' contains illegal character '{}'",
            name, c
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct TopicSettings {
    servers: Vec<String>,
    overrides: TopicBindings,
    validator: Option<Arc<dyn PayloadValidator>>,
}

impl TopicSettings {
    fn from_channel(name: &str, channel: &ChannelConfig) -> Self {
        Self {
            servers: channel.servers.clone(),
            overrides: channel.bindings.kafka.clone(),
            validator: validator::from_message(name, channel.publish_message()),
        }
    }
}

#[derive(Debug)]
pub struct Topic {
    pub name: String,
    partitions: RwLock<Vec<Arc<Partition>>>,
    settings: RwLock<TopicSettings>,
}

impl Topic {
    /// Create a topic from its channel, replicating every partition on `replicas`
    pub fn new(name: &str, channel: &ChannelConfig, replicas: &[i32]) -> Result<Self> {
        validate_topic_name(name)?;

        let partitions = (0..channel.partition_count())
            .map(|index| Arc::new(Partition::new(name, index, replicas.to_vec())))
            .collect();

        Ok(Self {
            name: name.to_string(),
            partitions: RwLock::new(partitions),
            settings: RwLock::new(TopicSettings::from_channel(name, channel)),
        })
    }

    pub fn partition(&self, index: i32) -> Option<Arc<Partition>> {
        if index < 0 {
            return None;
        }
        self.partitions.read().get(index as usize).cloned()
    }

    pub fn partitions(&self) -> Vec<Arc<Partition>> {
        self.partitions.read().clone()
    }

    pub fn partition_count(&self) -> i32 {
        self.partitions.read().len() as i32
    }

    /// An empty server list makes the topic visible on every broker
    pub fn is_visible_to(&self, broker_name: &str) -> bool {
        let settings = self.settings.read();
        settings.servers.is_empty() || settings.servers.iter().any(|s| s == broker_name)
    }

    pub fn validator(&self) -> Option<Arc<dyn PayloadValidator>> {
        self.settings.read().validator.clone()
    }

    /// Topic overrides win over the leading broker's settings
    pub fn retention_policy(&self, broker: &BrokerBindings) -> RetentionPolicy {
        let settings = self.settings.read();
        let overrides = &settings.overrides;
        RetentionPolicy {
            retention_ms: overrides.retention_ms.unwrap_or_else(|| broker.retention_ms()),
            retention_bytes: overrides
                .retention_bytes
                .unwrap_or_else(|| broker.retention_bytes()),
            segment_ms: overrides.segment_ms.unwrap_or_else(|| broker.segment_ms()),
        }
    }

    /// Replace the channel-derived settings
    pub(crate) fn configure(&self, channel: &ChannelConfig) {
        *self.settings.write() = TopicSettings::from_channel(&self.name, channel);
    }

    /// Grow or shrink to `count` partitions; dropped partitions release their log
    pub(crate) fn resize(&self, count: i32, replicas: &[i32]) {
        let count = count.max(1) as usize;
        let mut partitions = self.partitions.write();
        let current = partitions.len();

        if count < current {
            for partition in partitions.drain(count..) {
                partition.delete();
            }
            info!(topic = %self.name, "Removed {} partition(s)", current - count);
        } else if count > current {
            for index in current..count {
                partitions.push(Arc::new(Partition::new(
                    &self.name,
                    index as i32,
                    replicas.to_vec(),
                )));
            }
            info!(topic = %self.name, "Added {} partition(s)", count - current);
        }
    }

    /// Release every partition log
    pub(crate) fn delete(&self) {
        for partition in self.partitions.write().drain(..) {
            partition.delete();
        }
    }
}
