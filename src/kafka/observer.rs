//! Record observer
//!
//! Every successful append is reported once, with the traits identifying
//! where the record landed. The default observer writes a debug log line;
//! embedders plug in their own to ship events elsewhere.

use tracing::debug;

use super::constants::EVENT_NAMESPACE;
use super::messages::Record;

/// Where an appended record landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTraits {
    pub namespace: &'static str,
    pub cluster: String,
    pub topic: String,
    pub partition: i32,
}

impl EventTraits {
    pub fn new(cluster: impl Into<String>, topic: impl Into<String>, partition: i32) -> Self {
        Self {
            namespace: EVENT_NAMESPACE,
            cluster: cluster.into(),
            topic: topic.into(),
            partition,
        }
    }

    /// Traits as name/value pairs, in a stable order
    pub fn pairs(&self) -> [(&'static str, String); 4] {
        [
            ("namespace", self.namespace.to_string()),
            ("cluster", self.cluster.clone()),
            ("topic", self.topic.clone()),
            ("partition", self.partition.to_string()),
        ]
    }
}

/// Callback invoked once per appended record
///
/// Runs while the partition write lock is held, so implementations must
/// not call back into the store.
#[cfg_attr(test, mockall::automock)]
pub trait RecordObserver: Send + Sync {
    fn on_record(&self, record: &Record, partition: i32, traits: &EventTraits);
}

/// Observer that logs each record at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RecordObserver for LogObserver {
    fn on_record(&self, record: &Record, partition: i32, traits: &EventTraits) {
        debug!(
            namespace = traits.namespace,
            cluster = %traits.cluster,
            topic = %traits.topic,
            partition,
            offset = record.offset,
            "Record appended ({} key bytes, {} value bytes)",
            record.key.as_ref().map_or(0, |k| k.len()),
            record.value.as_ref().map_or(0, |v| v.len())
        );
    }
}
