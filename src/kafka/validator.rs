//! Payload validation
//!
//! Records produced to a topic are checked against the message schema the
//! channel declares on its publish operation. Without a schema or content
//! type there is nothing to check and no validator is built.

use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, error};

use super::cluster_config::MessageConfig;
use super::error::{KafkaError, Result};

/// Admission check for record values
pub trait PayloadValidator: Send + Sync + fmt::Debug {
    /// Reject `value` with [`KafkaError::Validation`] if it does not conform
    fn validate(&self, value: Option<&[u8]>) -> Result<()>;
}

/// Build the validator for a channel's publish message, if it declares one
///
/// Schemas that fail to compile are logged and treated as absent, so a bad
/// document never stops the rest of the cluster from loading.
pub fn from_message(
    topic: &str,
    message: Option<&MessageConfig>,
) -> Option<Arc<dyn PayloadValidator>> {
    let message = message?;
    let content_type = message.content_type.as_deref()?;
    let schema = message.payload.as_ref()?;

    if !is_json(content_type) {
        debug!(
            topic = %topic,
            content_type = %content_type,
            "No decoder for content type, payloads are not validated"
        );
        return None;
    }

    match JsonValidator::new(schema) {
        Ok(validator) => Some(Arc::new(validator)),
        Err(e) => {
            error!(topic = %topic, "Skipping payload validation: {}", e);
            None
        }
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// JSON payloads checked against a JSON Schema
pub struct JsonValidator {
    compiled: Validator,
}

impl JsonValidator {
    pub fn new(schema: &Value) -> Result<Self> {
        let compiled = Validator::new(schema)
            .map_err(|e| KafkaError::InvalidConfig(format!("Invalid JSON Schema: {}", e)))?;
        Ok(Self { compiled })
    }
}

impl fmt::Debug for JsonValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonValidator").finish_non_exhaustive()
    }
}

impl PayloadValidator for JsonValidator {
    fn validate(&self, value: Option<&[u8]>) -> Result<()> {
        // A null record value is checked as JSON null
        let instance: Value = match value {
            Some(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| KafkaError::validation(format!("invalid JSON: {}", e)))?,
            None => Value::Null,
        };

        self.compiled
            .validate(&instance)
            .map_err(|e| KafkaError::validation(e.to_string()))
    }
}
