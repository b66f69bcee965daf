// Runtime settings for mock_kafka
//
// These are the knobs that live outside the cluster document: where the
// listeners bind, how loud the logs are and the timing of shutdown, fetch
// long polling and rebalances. The binary fills them from CLI flags; every
// numeric value is clamped into its MIN/MAX range before use.

use tracing::warn;

use crate::kafka::constants::{
    DEFAULT_FETCH_POLL_INTERVAL_MS, DEFAULT_JOIN_WINDOW_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
    MAX_FETCH_POLL_INTERVAL_MS, MAX_JOIN_WINDOW_MS, MAX_SHUTDOWN_TIMEOUT_MS,
    MIN_FETCH_POLL_INTERVAL_MS, MIN_JOIN_WINDOW_MS, MIN_SHUTDOWN_TIMEOUT_MS,
};

/// Default log filter when neither RUST_LOG nor a flag is given
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration struct holding all runtime settings
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Bind every listener to this host instead of the one in the server URL
    pub host: Option<String>,
    /// Log filter directive used when RUST_LOG is unset
    pub log_level: String,
    /// How long shutdown waits for listeners and connections to finish
    pub shutdown_timeout_ms: u64,
    /// Polling interval for long polling fallback (milliseconds)
    pub fetch_poll_interval_ms: u64,
    /// How long a rebalance collects JoinGroup requests (milliseconds)
    pub join_window_ms: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host.as_deref().unwrap_or("<from server url>"))
            .field("log_level", &self.log_level)
            .field("shutdown_timeout_ms", &self.shutdown_timeout_ms)
            .field("fetch_poll_interval_ms", &self.fetch_poll_interval_ms)
            .field("join_window_ms", &self.join_window_ms)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            fetch_poll_interval_ms: DEFAULT_FETCH_POLL_INTERVAL_MS,
            join_window_ms: DEFAULT_JOIN_WINDOW_MS,
        }
    }
}

impl Config {
    /// Clamp every setting into its allowed range
    ///
    /// Out-of-range values are logged and replaced by the nearest bound. A
    /// blank host override is dropped, as is a blank log level.
    pub fn validated(mut self) -> Self {
        self.shutdown_timeout_ms = clamp_setting(
            "shutdown_timeout_ms",
            self.shutdown_timeout_ms,
            MIN_SHUTDOWN_TIMEOUT_MS,
            MAX_SHUTDOWN_TIMEOUT_MS,
        );
        self.fetch_poll_interval_ms = clamp_setting(
            "fetch_poll_interval_ms",
            self.fetch_poll_interval_ms,
            MIN_FETCH_POLL_INTERVAL_MS,
            MAX_FETCH_POLL_INTERVAL_MS,
        );
        self.join_window_ms = clamp_setting(
            "join_window_ms",
            self.join_window_ms,
            MIN_JOIN_WINDOW_MS,
            MAX_JOIN_WINDOW_MS,
        );

        if self.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
            warn!("Ignoring empty host override");
            self.host = None;
        }
        if self.log_level.trim().is_empty() {
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
        self
    }
}

fn clamp_setting(name: &str, value: u64, min: u64, max: u64) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("{} = {} is out of range {}..={}, using {}", name, value, min, max, clamped);
    }
    clamped
}
