//! Kafka protocol error types
//!
//! One error enum for the broker. Per-item failures are turned into numeric
//! Kafka error codes with [`KafkaError::to_kafka_error_code`]; anything else
//! tears down the connection that produced it.

use std::io::ErrorKind;

use thiserror::Error;

use crate::kafka::constants::{
    ERROR_CORRUPT_MESSAGE, ERROR_INVALID_TOPIC_EXCEPTION, ERROR_OFFSET_OUT_OF_RANGE,
    ERROR_TOPIC_ALREADY_EXISTS, ERROR_UNKNOWN_SERVER_ERROR, ERROR_UNKNOWN_TOPIC_OR_PARTITION,
    ERROR_UNSUPPORTED_VERSION, MAX_REQUEST_SIZE,
};

/// Errors that can occur inside the mock broker
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Request size is invalid (negative, zero, or exceeds maximum)
    #[error("Invalid request size: {0} (must be between 1 and {MAX_REQUEST_SIZE})")]
    InvalidRequestSize(i32),

    /// API key is not served by this broker
    #[error("Unsupported API key: {0}")]
    UnsupportedApiKey(i16),

    /// API key is served, but not at this version
    #[error("Unsupported version {api_version} for API key {api_key}")]
    UnsupportedVersion { api_key: i16, api_version: i16 },

    /// IO error occurred during network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error encoding or decoding protocol messages
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Record batch or embedded structure could not be decoded
    #[error("Corrupt message: {message}")]
    CorruptMessage { message: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Record value rejected by the topic's payload validator
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Error from kafka-protocol crate (anyhow::Error)
    #[error("Protocol encoding/decoding error: {0}")]
    ProtocolCodec(#[from] anyhow::Error),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),

    /// Fetch position before the earliest retained offset
    #[error("Offset {offset} out of range (log starts at {start})")]
    OffsetOutOfRange { offset: i64, start: i64 },

    /// Topic or partition does not exist
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// Topic name already taken
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// Topic name breaks the naming rules
    #[error("Invalid topic name: {0}")]
    InvalidTopic(String),
}

impl KafkaError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        KafkaError::CorruptMessage {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        KafkaError::Validation {
            message: message.into(),
        }
    }

    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        KafkaError::TopicNotFound(topic.into())
    }

    /// Convert this error to a Kafka protocol error code
    pub fn to_kafka_error_code(&self) -> i16 {
        match self {
            KafkaError::UnsupportedApiKey(_) | KafkaError::UnsupportedVersion { .. } => {
                ERROR_UNSUPPORTED_VERSION
            }
            KafkaError::CorruptMessage { .. } | KafkaError::Validation { .. } => {
                ERROR_CORRUPT_MESSAGE
            }
            KafkaError::OffsetOutOfRange { .. } => ERROR_OFFSET_OUT_OF_RANGE,
            KafkaError::TopicNotFound(_) => ERROR_UNKNOWN_TOPIC_OR_PARTITION,
            KafkaError::TopicAlreadyExists(_) => ERROR_TOPIC_ALREADY_EXISTS,
            KafkaError::InvalidTopic(_) => ERROR_INVALID_TOPIC_EXCEPTION,
            KafkaError::InvalidRequestSize(_)
            | KafkaError::Io(_)
            | KafkaError::Encoding(_)
            | KafkaError::InvalidConfig(_)
            | KafkaError::ProtocolCodec(_)
            | KafkaError::Internal(_) => ERROR_UNKNOWN_SERVER_ERROR,
        }
    }

    /// True for errors caused by the broker itself rather than the request
    pub fn is_server_error(&self) -> bool {
        self.to_kafka_error_code() == ERROR_UNKNOWN_SERVER_ERROR
    }

    /// True when a write failed only because the peer went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            KafkaError::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Result type alias for Kafka operations
pub type Result<T> = std::result::Result<T, KafkaError>;
