//! Server configuration.

use serde::{Deserialize, Serialize};
use shared_bus::{INBOUND_TOPIC, OUTBOUND_TOPIC};
use std::time::Duration;
use thiserror::Error;

/// Default identity replies are signed under.
pub const DEFAULT_SERVER_ID: &str = "iobc-server";

/// Gateway-side configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// User id the server signs replies as.
    pub server_id: String,
    /// Topic requests are consumed from.
    pub inbound_topic: String,
    /// Topic replies are published to.
    pub outbound_topic: String,
    /// How long a processed request is remembered to drop redeliveries.
    #[serde(with = "humantime_serde")]
    pub redelivery_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: DEFAULT_SERVER_ID.to_string(),
            inbound_topic: INBOUND_TOPIC.to_string(),
            outbound_topic: OUTBOUND_TOPIC.to_string(),
            redelivery_window: Duration::from_secs(120),
        }
    }
}

impl ServerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_id.trim().is_empty() {
            return Err(ConfigError::InvalidServerId);
        }

        if self.inbound_topic.is_empty() || self.outbound_topic.is_empty() {
            return Err(ConfigError::InvalidTopic("topic names cannot be empty".into()));
        }

        if self.inbound_topic == self.outbound_topic {
            return Err(ConfigError::InvalidTopic(format!(
                "requests and replies share topic '{}'",
                self.inbound_topic
            )));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("server_id cannot be empty")]
    InvalidServerId,
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}
