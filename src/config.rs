//! Application configuration
//!
//! Loaded from `config/<env>.yaml`, then overridden by environment
//! variables:
//!
//! | Variable                 | Field                        |
//! |--------------------------|------------------------------|
//! | `RUN_ADDRESS`            | `gateway.host`:`gateway.port`|
//! | `LOG_LEVEL`              | `log_level`                  |
//! | `DATABASE_URI`           | `postgres_url`               |
//! | `ACCRUAL_SYSTEM_ADDRESS` | `accrual.base_url`           |
//! | `JWT_KEY`                | `auth.jwt_secret`            |
//! | `JWT_EXP`                | `auth.token_ttl_hours`       |
//! | `BATCH_LIMIT`            | `accrual.batch_limit`        |
//! | `SEND_LIMIT`             | `accrual.send_limit`         |
//! | `POLL_INTERVAL`          | `accrual.poll_interval_secs` |
//! | `POOL_INTERVAL`          | same, when `POLL_INTERVAL` is unset |

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::reconcile::PollConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub postgres_url: String,
    pub accrual: AccrualConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccrualConfig {
    pub base_url: String,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_send_limit")]
    pub send_limit: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

fn default_batch_limit() -> usize {
    100
}

fn default_send_limit() -> usize {
    30
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_token_ttl_hours() -> i64 {
    3
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

impl AppConfig {
    /// Load `config/<env>.yaml` and apply process environment overrides.
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override fields from `lookup` (the process environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("RUN_ADDRESS") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| ConfigError::InvalidEnv {
                    var: "RUN_ADDRESS",
                    value: addr.clone(),
                })?;
            self.gateway.port = parse_env("RUN_ADDRESS", port.to_string())?;
            self.gateway.host = if host.is_empty() {
                "0.0.0.0".to_string()
            } else {
                host.to_string()
            };
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("DATABASE_URI") {
            self.postgres_url = v;
        }
        if let Some(v) = lookup("ACCRUAL_SYSTEM_ADDRESS") {
            self.accrual.base_url = v;
        }
        if let Some(v) = lookup("JWT_KEY") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = lookup("JWT_EXP") {
            self.auth.token_ttl_hours = parse_env("JWT_EXP", v)?;
        }
        if let Some(v) = lookup("BATCH_LIMIT") {
            self.accrual.batch_limit = parse_env("BATCH_LIMIT", v)?;
        }
        if let Some(v) = lookup("SEND_LIMIT") {
            self.accrual.send_limit = parse_env("SEND_LIMIT", v)?;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.accrual.poll_interval_secs = parse_env("POLL_INTERVAL", v)?;
        } else if let Some(v) = lookup("POOL_INTERVAL") {
            // Older deployments still export the misspelled name
            self.accrual.poll_interval_secs = parse_env("POOL_INTERVAL", v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.postgres_url.trim().is_empty() {
            return Err(ConfigError::Invalid("postgres_url is empty".into()));
        }
        if self.accrual.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("accrual.base_url is empty".into()));
        }
        if self.accrual.batch_limit == 0 || self.accrual.send_limit == 0 {
            return Err(ConfigError::Invalid(
                "accrual batch_limit and send_limit must be positive".into(),
            ));
        }
        if self.accrual.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "accrual.poll_interval_secs must be positive".into(),
            ));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid("auth.token_ttl_hours must be positive".into()));
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.gateway.host.as_str(), self.gateway.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "gateway address '{}:{}'",
                    self.gateway.host, self.gateway.port
                ))
            })
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            batch_limit: self.accrual.batch_limit,
            send_limit: self.accrual.send_limit,
            poll_interval: Duration::from_secs(self.accrual.poll_interval_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.accrual.request_timeout_secs)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.auth.token_ttl_hours)
    }
}
