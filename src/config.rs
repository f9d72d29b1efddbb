use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::transfer::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DepositoryConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8999".to_string(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub db_path: String,
    /// How long a transaction waits for a row lock before it counts as a conflict
    pub lock_timeout_ms: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/depository".to_string(),
            lock_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub sign_key: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            sign_key: "change-me".to_string(),
            access_ttl_secs: 10 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransferConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub deadline_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 5,
            deadline_ms: 5_000,
        }
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// What `load_or_default` ended up doing, reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(String),
    CreatedDefault(String),
    Default,
}

impl DepositoryConfig {
    /// Read `path`, or write the defaults there when it does not exist yet.
    pub fn load_or_default(path: &str) -> Result<(Self, ConfigSource), ConfigError> {
        if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
            let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
            Ok((config, ConfigSource::File(path.to_string())))
        } else {
            let config = Self::default();
            let written = toml::to_string_pretty(&config)
                .ok()
                .map(|s| std::fs::write(path, s).is_ok())
                .unwrap_or(false);
            let source = if written {
                ConfigSource::CreatedDefault(path.to_string())
            } else {
                ConfigSource::Default
            };
            Ok((config, source))
        }
    }

    /// `DEPOSITORY_*` environment variables win over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DEPOSITORY_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("DEPOSITORY_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Some(v) = lookup("DEPOSITORY_JWT_SECRET") {
            self.auth.sign_key = v;
        }
    }
}
