// Pending fetch registry for long polling
//
// Fetch handlers that have not yet collected `min_bytes` register one entry
// per topic-partition they read. Every append to a partition wakes the
// entries waiting on it; the handler then re-reads and decides whether to
// keep waiting.
//
// Registration happens before the first read so an append landing between
// the read and the wait still leaves a stored permit on the Notify.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

/// Key for identifying a topic-partition
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct TopicPartitionKey {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartitionKey {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

/// One fetch waiting on one topic-partition
#[derive(Debug)]
pub struct PendingFetch {
    pub notify: Arc<Notify>,
    /// Appends that leave the high watermark at or below this are ignored
    pub fetch_offset: i64,
}

/// Registry of fetch requests waiting for data
#[derive(Debug, Default)]
pub struct PendingFetchRegistry {
    inner: RwLock<HashMap<TopicPartitionKey, Vec<PendingFetch>>>,
}

impl PendingFetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `topic`/`partition` on an existing Notify
    ///
    /// A fetch spanning several partitions shares one Notify across all of
    /// its registrations.
    pub async fn register(&self, key: TopicPartitionKey, fetch_offset: i64, notify: &Arc<Notify>) {
        let pending = PendingFetch {
            notify: notify.clone(),
            fetch_offset,
        };
        let mut guard = self.inner.write().await;
        guard.entry(key).or_default().push(pending);
    }

    /// Wake fetches waiting on a partition whose high watermark moved past them
    pub async fn notify_new_data(&self, topic: &str, partition: i32, high_watermark: i64) {
        let key = TopicPartitionKey::new(topic, partition);
        let guard = self.inner.read().await;
        if let Some(pending_list) = guard.get(&key) {
            for pending in pending_list {
                if high_watermark > pending.fetch_offset {
                    pending.notify.notify_one();
                }
            }
        }
    }

    /// Drop every registration made with `notify`
    pub async fn unregister(&self, keys: &[TopicPartitionKey], notify: &Arc<Notify>) {
        let mut guard = self.inner.write().await;
        for key in keys {
            if let Some(pending_list) = guard.get_mut(key) {
                pending_list.retain(|p| !Arc::ptr_eq(&p.notify, notify));
                if pending_list.is_empty() {
                    guard.remove(key);
                }
            }
        }
    }

    /// Number of registrations (for testing/debugging)
    pub async fn len(&self) -> usize {
        let guard = self.inner.read().await;
        guard.values().map(|v| v.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn key(partition: i32) -> TopicPartitionKey {
        TopicPartitionKey::new("foo", partition)
    }

    #[tokio::test]
    async fn test_register_and_notify() {
        let registry = PendingFetchRegistry::new();
        let notify = Arc::new(Notify::new());
        registry.register(key(0), 0, &notify).await;
        assert_eq!(registry.len().await, 1);

        registry.notify_new_data("foo", 0, 1).await;

        let result = timeout(Duration::from_millis(100), notify.notified()).await;
        assert!(result.is_ok(), "Should have been notified");
    }

    #[tokio::test]
    async fn test_notify_wrong_partition() {
        let registry = PendingFetchRegistry::new();
        let notify = Arc::new(Notify::new());
        registry.register(key(0), 0, &notify).await;

        registry.notify_new_data("foo", 1, 10).await;
        registry.notify_new_data("bar", 0, 10).await;

        let result = timeout(Duration::from_millis(50), notify.notified()).await;
        assert!(result.is_err(), "Should NOT have been notified");
    }

    #[tokio::test]
    async fn test_notify_only_relevant_offsets() {
        let registry = PendingFetchRegistry::new();
        let notify = Arc::new(Notify::new());
        registry.register(key(0), 100, &notify).await;

        registry.notify_new_data("foo", 0, 50).await;
        let result = timeout(Duration::from_millis(50), notify.notified()).await;
        assert!(result.is_err(), "Should NOT have been notified for old offset");

        registry.notify_new_data("foo", 0, 101).await;
        let result = timeout(Duration::from_millis(100), notify.notified()).await;
        assert!(result.is_ok(), "Should have been notified for new offset");
    }

    #[tokio::test]
    async fn test_notify_before_wait_is_not_lost() {
        let registry = PendingFetchRegistry::new();
        let notify = Arc::new(Notify::new());
        registry.register(key(0), 0, &notify).await;

        registry.notify_new_data("foo", 0, 1).await;
        tokio::task::yield_now().await;

        let result = timeout(Duration::from_millis(50), notify.notified()).await;
        assert!(result.is_ok(), "Stored permit should wake the later wait");
    }

    #[tokio::test]
    async fn test_shared_notify_across_partitions() {
        let registry = PendingFetchRegistry::new();
        let notify = Arc::new(Notify::new());
        let keys = vec![key(0), key(1)];
        for k in &keys {
            registry.register(k.clone(), 0, &notify).await;
        }
        assert_eq!(registry.len().await, 2);

        registry.notify_new_data("foo", 1, 1).await;
        let result = timeout(Duration::from_millis(100), notify.notified()).await;
        assert!(result.is_ok());

        registry.unregister(&keys, &notify).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unregister_keeps_other_waiters() {
        let registry = PendingFetchRegistry::new();
        let first = Arc::new(Notify::new());
        let second = Arc::new(Notify::new());
        registry.register(key(0), 0, &first).await;
        registry.register(key(0), 0, &second).await;

        registry.unregister(&[key(0)], &first).await;
        assert_eq!(registry.len().await, 1);

        registry.notify_new_data("foo", 0, 1).await;
        let result = timeout(Duration::from_millis(100), second.notified()).await;
        assert!(result.is_ok());
    }
}
