// Kafka protocol implementation module
//
// This module contains all Kafka-specific code:
// - Binary protocol parsing/encoding
// - Request/response types
// - TCP listener for accepting Kafka client connections
// - The cluster store with its brokers, topics and consumer groups
// - Request handlers, one per supported API
//
// Architecture Overview:
// =====================
//
// Every connection task decodes its frames and hands each request to
// `Store::serve` together with the connection's `ClientContext`. The store
// resolves the broker the client connected to, builds a `HandlerContext` and
// dispatches on the API key. Handlers touch the shared cluster state through
// short parking_lot critical sections and only await on two things: a fetch
// waiting for data and a JoinGroup/SyncGroup waiting for the balancer.
//
//   reader → [decode] → Store::serve → handler → [response channel] → writer

pub mod broker;
pub mod cluster_config;
pub mod constants;
pub mod context;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod handler_context;
pub mod handlers;
pub mod listener;
pub mod messages;
pub mod metrics;
pub mod observer;
pub mod pending_fetches;
pub mod protocol;
pub mod response_builders;
pub mod storage;
pub mod store;
pub mod validator;

// Re-export commonly used types for convenience
pub use cluster_config::ClusterConfig;
pub use constants::*;
pub use context::ClientContext;
pub use error::{KafkaError, Result};
pub use listener::run as run_listener;
pub use messages::{KafkaRequest, KafkaResponse, Record};
pub use observer::{EventTraits, RecordObserver};
pub use store::{Store, StoreOptions};
