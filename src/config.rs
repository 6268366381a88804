//! Configuration for the client and the `tzops` binary
//!
//! Loaded from a TOML file, then overridden by environment variables
//! (a `.env` file is honoured through `dotenvy`).

use crate::context::PollingConfig;
use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,

    #[serde(default)]
    pub polling: PollingSection,

    /// Protocol hash forced for policy decisions instead of the node's
    /// `next_protocol`
    #[serde(default)]
    pub protocol: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Node base URL
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_chain")]
    pub chain: String,

    #[serde(default = "default_block")]
    pub block: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSection {
    #[serde(default = "default_confirmation_interval")]
    pub confirmation_interval_secs: u64,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_confirmations")]
    pub default_confirmations: u32,

    #[serde(default = "default_stream_interval")]
    pub stream_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_rpc_timeout() -> u64 { 30 }
fn default_chain() -> String { "main".to_string() }
fn default_block() -> String { "head".to_string() }
fn default_confirmation_interval() -> u64 { 10 }
fn default_confirmation_timeout() -> u64 { 180 }
fn default_confirmations() -> u32 { 1 }
fn default_stream_interval() -> u64 { 20 }
fn default_log_level() -> String { "info".to_string() }

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            confirmation_interval_secs: default_confirmation_interval(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            default_confirmations: default_confirmations(),
            stream_interval_secs: default_stream_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                url: "http://localhost:8732".to_string(),
                timeout_secs: default_rpc_timeout(),
                chain: default_chain(),
                block: default_block(),
            },
            polling: PollingSection::default(),
            protocol: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from file, apply environment overrides and validate
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides read through `lookup`, so tests need not touch the
    /// process environment
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("TEZOS_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(protocol) = lookup("TEZOS_PROTOCOL") {
            self.protocol = Some(protocol);
        }
        let polling = &mut self.polling;
        override_number(&lookup, "TEZOS_CONFIRMATION_INTERVAL_SECS", &mut polling.confirmation_interval_secs)?;
        override_number(&lookup, "TEZOS_CONFIRMATION_TIMEOUT_SECS", &mut polling.confirmation_timeout_secs)?;
        override_number(&lookup, "TEZOS_DEFAULT_CONFIRMATIONS", &mut polling.default_confirmations)?;
        override_number(&lookup, "TEZOS_STREAM_INTERVAL_SECS", &mut polling.stream_interval_secs)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc.url.starts_with("http://") || self.rpc.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "rpc.url must be an http(s) URL, got {:?}",
                self.rpc.url
            )));
        }
        if self.rpc.timeout_secs == 0 {
            return Err(ConfigError::Invalid("rpc.timeout_secs must be positive".into()));
        }
        if self.polling.confirmation_interval_secs == 0
            || self.polling.confirmation_timeout_secs == 0
        {
            return Err(ConfigError::Invalid(
                "confirmation polling interval and timeout must be positive".into(),
            ));
        }
        if self.polling.stream_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.stream_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig {
            confirmation_polling_interval: Duration::from_secs(
                self.polling.confirmation_interval_secs,
            ),
            confirmation_polling_timeout: Duration::from_secs(
                self.polling.confirmation_timeout_secs,
            ),
            default_confirmations: self.polling.default_confirmations,
            stream_polling_interval: Duration::from_secs(self.polling.stream_interval_secs),
        }
    }

    pub fn protocol_hint(&self) -> Option<Protocol> {
        self.protocol.as_deref().map(Protocol::from_hash)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}
