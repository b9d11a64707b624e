//! Client configuration with validation.

use serde::{Deserialize, Serialize};
use shared_bus::{INBOUND_TOPIC, OUTBOUND_TOPIC};
use std::time::Duration;
use thiserror::Error;

/// Caller-side configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long a registered request waits for its reply.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How often expired registrations are swept.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// How long a processed reply is remembered to drop redeliveries.
    #[serde(with = "humantime_serde")]
    pub redelivery_window: Duration,
    /// Topic requests are published to.
    pub inbound_topic: String,
    /// Topic replies are consumed from.
    pub outbound_topic: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            redelivery_window: Duration::from_secs(120),
            inbound_topic: INBOUND_TOPIC.to_string(),
            outbound_topic: OUTBOUND_TOPIC.to_string(),
        }
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
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
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ClientConfig {
            request_timeout: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_shared_topic_rejected() {
        let config = ClientConfig {
            outbound_topic: INBOUND_TOPIC.to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTopic(_))));
    }

    #[test]
    fn test_humantime_durations() {
        let config: ClientConfig = toml::from_str(
            r#"
            request_timeout = "5s"
            sweep_interval = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_millis(250));
        assert_eq!(config.redelivery_window, Duration::from_secs(120));
        assert_eq!(config.outbound_topic, OUTBOUND_TOPIC);
    }
}
