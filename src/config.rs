//! Configuration loading from TOML files.
//!
//! Every section has working defaults so the service can start with an empty
//! config file; [`Config::load`] validates field values after parsing.

use std::path::Path;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub broadcast: BroadcastConfig,
    pub expiry: ExpiryConfig,
    pub delivery: DeliveryConfig,
    pub cipher: CipherConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// WebSocket JSON-RPC endpoint.
    pub ws_url: String,
    /// Subscription manager contract emitting the three tracked events.
    pub contract_address: String,
    pub network: String,
    /// Liveness probe period for the event listener.
    pub probe_interval_secs: u64,
    pub reconnect: ReconnectConfig,
}

/// Exponential backoff settings for listener reconnection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Default confirmation window when a request does not supply one.
    pub default_expiry_minutes: i64,
    /// Budget for the protocol executor's gas estimate before the fallback
    /// estimate is used.
    pub gas_estimate_timeout_ms: u64,
    pub fallback_gas_limit: u64,
    /// Gas price in wei used with the fallback estimate.
    pub fallback_gas_price_wei: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub sweep_interval_secs: u64,
    /// Broadcasts expiring within this window get an informational warning.
    pub warning_window_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Per-connection SSE frame buffer.
    pub channel_capacity: usize,
    pub heartbeat_interval_secs: u64,
    pub retry_interval_secs: u64,
    pub max_retries: i32,
    /// Capacity of the in-process event dispatcher.
    pub dispatcher_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// AES-256 key as 64 hex characters. The all-zero default is only
    /// suitable for local development.
    pub key_hex: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(ConfigError::MissingField {
                field: "database.url",
            }
            .into());
        }
        if !self.chain.ws_url.is_empty() {
            url::Url::parse(&self.chain.ws_url)?;
        }
        if !(1..=60).contains(&self.broadcast.default_expiry_minutes) {
            return Err(ConfigError::InvalidValue {
                field: "broadcast.default_expiry_minutes",
                reason: format!(
                    "must be between 1 and 60, got {}",
                    self.broadcast.default_expiry_minutes
                ),
            }
            .into());
        }
        if self.chain.reconnect.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "chain.reconnect.backoff_multiplier",
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }
        let key = &self.cipher.key_hex;
        if hex::decode(key).map(|k| k.len() != 32).unwrap_or(true) {
            return Err(ConfigError::InvalidValue {
                field: "cipher.key_hex",
                reason: "must be 64 hex characters (32 bytes)".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.logging.level));

        match self.logging.format.as_str() {
            "json" => fmt().with_env_filter(filter).json().init(),
            _ => fmt().with_env_filter(filter).init(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            chain: ChainConfig::default(),
            broadcast: BroadcastConfig::default(),
            expiry: ExpiryConfig::default(),
            delivery: DeliveryConfig::default(),
            cipher: CipherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "tradecast.db".into(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            contract_address: String::new(),
            network: "mainnet".into(),
            probe_interval_secs: 30,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            default_expiry_minutes: 5,
            gas_estimate_timeout_ms: 3_000,
            fallback_gas_limit: 350_000,
            fallback_gas_price_wei: 30_000_000_000,
        }
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            warning_window_minutes: 5,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            heartbeat_interval_secs: 30,
            retry_interval_secs: 15,
            max_retries: 3,
            dispatcher_capacity: 256,
        }
    }
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            key_hex: "00".repeat(32),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}
