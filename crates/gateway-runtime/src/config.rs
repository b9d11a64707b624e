//! # Gateway Configuration
//!
//! Loaded in three layers:
//!
//! 1. Defaults
//! 2. An optional TOML file
//! 3. Environment overrides (`IOBC_LOG_LEVEL`, `IOBC_REQUEST_TIMEOUT_SECS`,
//!    `IOBC_PARTITIONS`)
//!
//! then validated as a whole.
//!
//! ## File Format
//!
//! ```toml
//! log_level = "debug"
//!
//! [bus]
//! partitions = 4
//! capacity = 1000
//!
//! [client]
//! request_timeout = "10s"
//!
//! [server]
//! server_id = "iobc-server"
//!
//! [chains]
//! eth = 19000000
//!
//! [[keys]]
//! user_id = "alice"
//! algorithm = "HmacSHA256"
//! secret = "616c6963652d736563726574"
//! ```

use iobc_client::ClientConfig;
use iobc_server::ServerConfig;
use serde::{Deserialize, Serialize};
use shared_bus::BusConfig;
use shared_types::{KeySpecification, SignatureAlgorithm, SimpleKeyProvider};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `log_level`.
pub const ENV_LOG_LEVEL: &str = "IOBC_LOG_LEVEL";
/// Environment variable overriding `client.request_timeout`, in whole seconds.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "IOBC_REQUEST_TIMEOUT_SECS";
/// Environment variable overriding `bus.partitions`.
pub const ENV_PARTITIONS: &str = "IOBC_PARTITIONS";

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Default log filter, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Bus sizing.
    pub bus: BusConfig,
    /// Caller side.
    pub client: ClientConfig,
    /// Gateway side.
    pub server: ServerConfig,
    /// Starting block heights served by the stand-in connector.
    pub chains: BTreeMap<String, u64>,
    /// Key material per user identity, the server's included.
    pub keys: Vec<KeyEntry>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bus: BusConfig::default(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
            chains: BTreeMap::new(),
            keys: Vec::new(),
        }
    }
}

/// One configured key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Identity the key belongs to.
    pub user_id: String,
    /// Algorithm name, `HmacSHA256` when omitted.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Hex-encoded signing material: shared secret, Ed25519 seed or
    /// secp256k1 scalar.
    pub secret: String,
}

fn default_algorithm() -> String {
    SignatureAlgorithm::HmacSha256.name().to_string()
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("user_id", &self.user_id)
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl KeyEntry {
    fn to_signing_key(&self) -> Result<KeySpecification, ConfigError> {
        let material = hex::decode(&self.secret).map_err(|e| ConfigError::Key {
            user_id: self.user_id.clone(),
            reason: format!("secret is not hex: {e}"),
        })?;
        Ok(KeySpecification::new(
            self.user_id.clone(),
            self.algorithm.clone(),
            material,
        ))
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid client configuration: {0}")]
    Client(#[from] iobc_client::ConfigError),

    #[error("Invalid server configuration: {0}")]
    Server(#[from] iobc_server::ConfigError),

    #[error("Invalid key for '{user_id}': {reason}")]
    Key { user_id: String, reason: String },
}

impl GatewayConfig {
    /// Load from `path` (defaults when `None`), apply environment overrides
    /// and validate.
    ///
    /// Runs before logging is set up, so it reports through its result only.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::parse(&content)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing sections take their defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides read through `lookup`, normally the process
    /// environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }

        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{ENV_REQUEST_TIMEOUT_SECS} must be whole seconds, got '{secs}'"
                ))
            })?;
            self.client.request_timeout = Duration::from_secs(secs);
        }

        if let Some(partitions) = lookup(ENV_PARTITIONS) {
            self.bus.partitions = partitions.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{ENV_PARTITIONS} must be a number, got '{partitions}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration as a whole.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.partitions == 0 {
            return Err(ConfigError::Invalid("bus.partitions cannot be 0".into()));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::Invalid("bus.capacity cannot be 0".into()));
        }

        self.client.validate()?;
        self.server.validate()?;

        if self.client.inbound_topic != self.server.inbound_topic
            || self.client.outbound_topic != self.server.outbound_topic
        {
            return Err(ConfigError::Invalid(
                "client and server must use the same request and reply topics".into(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.keys {
            if !seen.insert(entry.user_id.as_str()) {
                return Err(ConfigError::Key {
                    user_id: entry.user_id.clone(),
                    reason: "configured more than once".into(),
                });
            }
            self.verifying_pair(entry)?;
        }

        if !seen.contains(self.server.server_id.as_str()) {
            return Err(ConfigError::Key {
                user_id: self.server.server_id.clone(),
                reason: "server identity has no key".into(),
            });
        }

        Ok(())
    }

    fn verifying_pair(
        &self,
        entry: &KeyEntry,
    ) -> Result<(KeySpecification, KeySpecification), ConfigError> {
        let signing = entry.to_signing_key()?;
        let verifying = signing.to_verifying_key().map_err(|e| ConfigError::Key {
            user_id: entry.user_id.clone(),
            reason: e.to_string(),
        })?;
        Ok((signing, verifying))
    }

    /// Build a key provider holding every configured signing key and its
    /// verifying counterpart.
    pub fn key_provider(&self) -> Result<SimpleKeyProvider, ConfigError> {
        let provider = SimpleKeyProvider::new();
        for entry in &self.keys {
            let (signing, verifying) = self.verifying_pair(entry)?;
            provider.set_signing_key(entry.user_id.clone(), Some(signing));
            provider.set_verifying_key(entry.user_id.clone(), Some(verifying));
        }
        Ok(provider)
    }
}
