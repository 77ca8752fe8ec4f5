//! Service configuration from environment variables
//!
//! - `PORT` - Listen port (default: 8080)
//! - `LOG_LEVEL` - Minimum log level (default: info)
//! - `LOG_TYPE` - Log encoding, `text` or `json` (default: json)
//!
//! Configuration is loaded and validated once, before any listener or
//! telemetry component starts. Any invalid value is fatal.

pub mod log;

pub use log::{init_logging, parse_log_level, LogFormat};

use std::net::SocketAddr;
use thiserror::Error;
use tracing::Level;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default log level name
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log encoding name
pub const DEFAULT_LOG_TYPE: &str = "json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid PORT: {0}")]
    InvalidPort(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log type: {0}")]
    InvalidLogType(String),
}

/// Immutable service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub log_level: Level,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_level: Level::INFO,
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated as unset, so `PORT=` falls back to the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_PORT,
        };

        let log_level =
            parse_log_level(var("LOG_LEVEL").as_deref().unwrap_or(DEFAULT_LOG_LEVEL))?;

        let log_format: LogFormat = var("LOG_TYPE")
            .as_deref()
            .unwrap_or(DEFAULT_LOG_TYPE)
            .parse()?;

        Ok(Self {
            port,
            log_level,
            log_format,
        })
    }

    /// Address the listener binds to (all interfaces)
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.parse::<u16>()
        .map_err(|e| ConfigError::InvalidPort(format!("{}: {}", raw, e)))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
