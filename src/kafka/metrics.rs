//! Telemetry hooks
//!
//! Published through the `metrics` facade; nothing is recorded unless the
//! embedding process installs a recorder.

use std::time::{SystemTime, UNIX_EPOCH};

use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const MESSAGES_TOTAL: &str = "kafka_messages_total";
pub const LAST_MESSAGE_TIMESTAMP: &str = "kafka_message_timestamp";
pub const CONSUMER_GROUP_LAG: &str = "kafka_consumer_group_lag";

/// Register descriptions with the installed recorder
pub fn describe() {
    describe_counter!(MESSAGES_TOTAL, "Records appended per topic");
    describe_gauge!(
        LAST_MESSAGE_TIMESTAMP,
        "Unix time in seconds of the last append per topic"
    );
    describe_gauge!(
        CONSUMER_GROUP_LAG,
        "High watermark minus committed offset per group partition"
    );
}

/// Count one record appended at `appended_at`
pub fn record_message(cluster: &str, topic: &str, appended_at: SystemTime) {
    counter!(MESSAGES_TOTAL, "cluster" => cluster.to_string(), "topic" => topic.to_string())
        .increment(1);
    gauge!(
        LAST_MESSAGE_TIMESTAMP,
        "cluster" => cluster.to_string(),
        "topic" => topic.to_string()
    )
    .set(unix_seconds(appended_at));
}

pub fn record_lag(cluster: &str, group: &str, topic: &str, partition: i32, lag: i64) {
    gauge!(
        CONSUMER_GROUP_LAG,
        "cluster" => cluster.to_string(),
        "group" => group.to_string(),
        "topic" => topic.to_string(),
        "partition" => partition.to_string()
    )
    .set(lag as f64);
}

fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::GaugeCapture;

    #[test]
    fn test_message_timestamp_is_append_time_in_seconds() {
        let recorder = GaugeCapture::new(LAST_MESSAGE_TIMESTAMP);
        let appended_at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_500);
        metrics::with_local_recorder(&recorder, || {
            record_message("test", "foo", appended_at);
        });
        assert_eq!(recorder.value(), 1_700_000_000.5);
    }

    #[test]
    fn test_time_before_epoch_reports_zero() {
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_secs(5)), 0.0);
    }
}
