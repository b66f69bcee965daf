// Broker identity and retention ticker
//
// A broker is the addressable identity of one configured server. Each broker
// runs a retention ticker that rolls and cleans the partitions it leads; the
// ticker is stopped when the broker leaves the configuration.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use url::Url;

use super::cluster_config::{BrokerBindings, ServerConfig};
use super::constants::{
    DEFAULT_KAFKA_PORT, DEFAULT_LOG_RETENTION_CHECK_INTERVAL_MS, DEFAULT_URL_SCHEME,
};
use super::error::{KafkaError, Result};

/// Split a server URL into host and port
///
/// `host:port` without a scheme is accepted; a missing port means 9092.
pub fn parse_broker_address(url: &str) -> Result<(String, i32)> {
    let text = if url.contains("://") {
        url.to_string()
    } else {
        format!("{}://{}", DEFAULT_URL_SCHEME, url)
    };

    let parsed = Url::parse(&text)
        .map_err(|e| KafkaError::InvalidConfig(format!("invalid broker url '{}': {}", url, e)))?;

    let host = parsed
        .host_str()
        .unwrap_or_default()
        .trim_start_matches('[')
        .trim_end_matches(']');
    if host.is_empty() {
        return Err(KafkaError::InvalidConfig(format!(
            "broker url '{}' has no host",
            url
        )));
    }

    let port = parsed.port().map(i32::from).unwrap_or(DEFAULT_KAFKA_PORT);
    Ok((host.to_string(), port))
}

/// Address card of a broker, as handed to request handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub id: i32,
    pub name: String,
    pub host: String,
    pub port: i32,
}

/// One configured server
#[derive(Debug)]
pub struct Broker {
    pub id: i32,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub bindings: BrokerBindings,
    ticker: Option<RetentionTicker>,
}

impl Broker {
    pub fn new(id: i32, name: impl Into<String>, host: impl Into<String>, port: i32) -> Self {
        Self {
            id,
            name: name.into(),
            host: host.into(),
            port,
            bindings: BrokerBindings::default(),
            ticker: None,
        }
    }

    /// Build a broker from its server entry; fails on an unusable URL
    pub fn from_config(id: i32, name: &str, server: &ServerConfig) -> Result<Self> {
        let (host, port) = parse_broker_address(&server.url)?;
        let mut broker = Broker::new(id, name, host, port);
        broker.bindings = server.bindings.kafka.clone();
        Ok(broker)
    }

    pub fn info(&self) -> BrokerInfo {
        BrokerInfo {
            id: self.id,
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Period of the retention ticker
    pub fn retention_check_interval(&self) -> Duration {
        let ms = match self.bindings.retention_check_interval_ms() {
            ms if ms > 0 => ms,
            _ => DEFAULT_LOG_RETENTION_CHECK_INTERVAL_MS,
        };
        Duration::from_millis(ms as u64)
    }

    pub fn has_ticker(&self) -> bool {
        self.ticker.is_some()
    }

    /// Replace the running ticker; `None` just stops the current one
    pub(crate) fn set_ticker(&mut self, ticker: Option<RetentionTicker>) {
        if let Some(old) = self.ticker.take() {
            old.stop();
        }
        self.ticker = ticker;
    }
}

/// Handle of a running retention ticker; dropping it stops the task
#[derive(Debug)]
pub struct RetentionTicker {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RetentionTicker {
    /// Spawn a task calling `tick` every `period` until stopped
    ///
    /// `tick` returns false once there is nothing left to clean, which ends
    /// the task. Returns `None` outside a Tokio runtime.
    pub fn spawn<F>(broker: &str, period: Duration, mut tick: F) -> Option<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(broker = %broker, "No async runtime, retention is disabled");
                return None;
            }
        };

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let name = broker.to_string();
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        if !tick() {
                            break;
                        }
                    }
                }
            }
            debug!(broker = %name, "Retention ticker stopped");
        });

        Some(Self {
            stop: Some(stop_tx),
            handle,
        })
    }

    pub fn stop(mut self) {
        self.signal();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn signal(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for RetentionTicker {
    fn drop(&mut self) {
        self.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_broker_address() {
        assert_eq!(
            parse_broker_address("localhost").unwrap(),
            ("localhost".to_string(), 9092)
        );
        assert_eq!(
            parse_broker_address("127.0.0.1:19092").unwrap(),
            ("127.0.0.1".to_string(), 19092)
        );
        assert_eq!(
            parse_broker_address("kafka://broker.example.com:9093").unwrap(),
            ("broker.example.com".to_string(), 9093)
        );
        assert_eq!(
            parse_broker_address("[::1]:9094").unwrap(),
            ("::1".to_string(), 9094)
        );
    }

    #[test]
    fn test_parse_broker_address_rejects_missing_host() {
        assert!(parse_broker_address("").is_err());
        assert!(parse_broker_address(":9092").is_err());
        assert!(parse_broker_address("kafka://host:notaport").is_err());
    }

    #[test]
    fn test_broker_from_config() {
        let server = ServerConfig {
            url: "localhost:9093".into(),
            ..Default::default()
        };
        let broker = Broker::from_config(2, "b", &server).unwrap();
        assert_eq!(broker.id, 2);
        assert_eq!(broker.addr(), "localhost:9093");
        assert_eq!(
            broker.retention_check_interval(),
            Duration::from_millis(DEFAULT_LOG_RETENTION_CHECK_INTERVAL_MS as u64)
        );
    }

    #[test]
    fn test_ticker_needs_runtime() {
        assert!(RetentionTicker::spawn("b", Duration::from_millis(10), || true).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = RetentionTicker::spawn("b", Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        ticker.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_ends_when_tick_declines() {
        let ticker =
            RetentionTicker::spawn("b", Duration::from_millis(100), || false).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(ticker.is_finished());
    }
}
