//! Cluster document
//!
//! The topology a mock cluster is built from: cluster name, servers (brokers)
//! and channels (topics). The shape follows an AsyncAPI document, reduced to
//! the parts the broker consumes. Documents are loaded from YAML or JSON with
//! serde; [`crate::kafka::Store::update`] reconciles a running cluster
//! against a new document.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::constants::*;
use super::error::{KafkaError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub info: Info,
    /// Server name -> server; document order decides broker id allocation
    pub servers: IndexMap<String, ServerConfig>,
    /// Channel name (= topic name) -> channel
    pub channels: IndexMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub protocol: String,
    pub description: Option<String>,
    pub bindings: ServerBindings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerBindings {
    pub kafka: BrokerBindings,
}

/// Broker-level log settings
///
/// Typed fields win over the same key in the free-form `config` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerBindings {
    #[serde(alias = "log.retention.ms")]
    pub log_retention_ms: Option<i64>,
    #[serde(alias = "log.retention.bytes")]
    pub log_retention_bytes: Option<i64>,
    #[serde(alias = "log.segment.ms")]
    pub log_segment_ms: Option<i64>,
    #[serde(alias = "log.retention.check.interval.ms")]
    pub log_retention_check_interval_ms: Option<i64>,
    pub config: IndexMap<String, String>,
}

impl BrokerBindings {
    fn resolve(&self, typed: Option<i64>, key: &str, default: i64) -> i64 {
        typed
            .or_else(|| self.config.get(key).and_then(|v| v.trim().parse().ok()))
            .unwrap_or(default)
    }

    pub fn retention_ms(&self) -> i64 {
        self.resolve(
            self.log_retention_ms,
            "log.retention.ms",
            DEFAULT_LOG_RETENTION_MS,
        )
    }

    pub fn retention_bytes(&self) -> i64 {
        self.resolve(
            self.log_retention_bytes,
            "log.retention.bytes",
            DEFAULT_LOG_RETENTION_BYTES,
        )
    }

    pub fn segment_ms(&self) -> i64 {
        self.resolve(self.log_segment_ms, "log.segment.ms", DEFAULT_LOG_SEGMENT_MS)
    }

    pub fn retention_check_interval_ms(&self) -> i64 {
        self.resolve(
            self.log_retention_check_interval_ms,
            "log.retention.check.interval.ms",
            DEFAULT_LOG_RETENTION_CHECK_INTERVAL_MS,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub description: Option<String>,
    /// Names of the servers the topic is visible on; empty means all
    pub servers: Vec<String>,
    pub bindings: ChannelBindings,
    pub publish: Option<OperationConfig>,
    pub subscribe: Option<OperationConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelBindings {
    pub kafka: TopicBindings,
}

/// Topic-level overrides of the broker log settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicBindings {
    pub partitions: Option<i32>,
    #[serde(alias = "retention.ms")]
    pub retention_ms: Option<i64>,
    #[serde(alias = "retention.bytes")]
    pub retention_bytes: Option<i64>,
    #[serde(alias = "segment.ms")]
    pub segment_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    pub message: Option<MessageConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    #[serde(rename = "contentType", alias = "content_type")]
    pub content_type: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl ChannelConfig {
    /// Configured partition count, falling back to one partition
    pub fn partition_count(&self) -> i32 {
        self.bindings
            .kafka
            .partitions
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_TOPIC_PARTITIONS)
    }

    /// Message declared on the publish operation
    pub fn publish_message(&self) -> Option<&MessageConfig> {
        self.publish.as_ref().and_then(|op| op.message.as_ref())
    }

    /// A channel with the given partition count and no schema
    pub fn with_partitions(partitions: i32) -> Self {
        let mut channel = ChannelConfig::default();
        channel.bindings.kafka.partitions = Some(partitions);
        channel
    }
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        let mut config = ClusterConfig::default();
        config.info.name = name.into();
        config
    }

    pub fn with_server(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        let server = ServerConfig {
            url: url.into(),
            protocol: "kafka".to_string(),
            ..Default::default()
        };
        self.servers.insert(name.into(), server);
        self
    }

    pub fn with_channel(mut self, name: impl Into<String>, channel: ChannelConfig) -> Self {
        self.channels.insert(name.into(), channel);
        self
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| KafkaError::InvalidConfig(format!("cluster document: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| KafkaError::InvalidConfig(format!("cluster document: {}", e)))
    }

    /// Load a document, choosing the format by file extension (YAML unless `.json`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            KafkaError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }
}
