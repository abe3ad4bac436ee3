#![warn(missing_docs)]
//! Process-level defaults and environment overrides, following the
//! teacher's "defaults + env override" config pattern — plain env reads
//! rather than a file format, since this system has no config file.

use std::net::SocketAddr;

/// Default server listen port (`spec.md` §6).
pub const DEFAULT_PORT: u16 = 6552;

/// Default server bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Errors produced while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `RDB_PORT` was set but is not a valid `u16`.
    #[error("invalid RDB_PORT value: {value}")]
    InvalidPort {
        /// The offending environment value.
        value: String,
    },
    /// The resolved bind address/port could not be parsed as a socket
    /// address.
    #[error("invalid bind address '{bind}:{port}': {reason}")]
    InvalidBindAddr {
        /// The bind host.
        bind: String,
        /// The bind port.
        port: u16,
        /// Parse failure detail.
        reason: String,
    },
}

/// Process-level configuration, defaults overridden by environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdbConfig {
    /// Default cluster spec string for clients that don't pass `-s`
    /// (`RDB_SERVER`, `spec.md` §6).
    pub server: Option<String>,
    /// Server bind host (`RDB_BIND`).
    pub bind: String,
    /// Server bind port (`RDB_PORT`).
    pub port: u16,
}

impl Default for RdbConfig {
    fn default() -> Self {
        Self {
            server: None,
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl RdbConfig {
    /// Load defaults, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `RDB_SERVER`/`RDB_BIND`/`RDB_PORT` overrides in place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("RDB_SERVER") {
            self.server = Some(val);
        }
        if let Ok(val) = std::env::var("RDB_BIND") {
            self.bind = val;
        }
        if let Ok(val) = std::env::var("RDB_PORT") {
            self.port = val
                .parse()
                .map_err(|_| ConfigError::InvalidPort { value: val })?;
        }
        Ok(())
    }

    /// Resolve the configured bind host/port into a [`SocketAddr`].
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidBindAddr {
                bind: self.bind.clone(),
                port: self.port,
                reason: e.to_string(),
            })
    }
}
