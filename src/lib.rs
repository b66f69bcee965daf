//! mock_kafka: an in-memory mock Kafka cluster
//!
//! A cluster is described by an AsyncAPI-style document (servers become
//! brokers, channels become topics) and served over the real Kafka wire
//! protocol, so unmodified Kafka clients can produce, fetch and run consumer
//! groups against it.
//!
//! The entry point is [`kafka::Store`]; [`kafka::listener::run`] exposes one
//! broker over TCP.

pub mod config; // Runtime settings (CLI flags)
pub mod kafka; // Kafka protocol implementation (listener, protocol, store, handlers)

// Test utilities (only compiled in test builds)
#[cfg(test)]
pub mod testing;
