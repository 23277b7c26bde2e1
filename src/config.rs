//! Configuration for memrelay
//!
//! Centralized configuration with sensible defaults. A `Config` value is
//! handed to each component when it is built; nothing reads settings from
//! global state.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::pool::PoolConfig;
use crate::protocol::DEFAULT_MAX_BODY_LENGTH;

/// Default listen address for server mode
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:11212";

/// Default listen address for proxy mode
pub const DEFAULT_PROXY_ADDR: &str = "127.0.0.1:11211";

/// Main configuration for a memrelay instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Client read timeout (milliseconds, 0 = wait forever)
    pub read_timeout_ms: u64,

    /// Client write timeout (milliseconds, 0 = wait forever)
    pub write_timeout_ms: u64,

    /// Largest request body accepted before the connection is dropped
    pub max_body_length: usize,

    // -------------------------------------------------------------------------
    // Proxy Configuration
    // -------------------------------------------------------------------------
    /// Backend addresses (host:port) keys are sharded across
    pub backends: Vec<String>,

    /// Read/write timeout on backend sockets (milliseconds, 0 = wait forever)
    pub backend_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Pool Configuration
    // -------------------------------------------------------------------------
    /// How often idle backend connections are swept
    pub pool_sweep_interval_ms: u64,

    /// Idle time after which a pooled connection is evicted
    pub pool_ttl_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_SERVER_ADDR.to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            backends: Vec::new(),
            backend_timeout_ms: 5000,
            pool_sweep_interval_ms: 60_000,
            pool_ttl_ms: 30_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| RelayError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Backend socket timeout, `None` when disabled
    pub fn backend_timeout(&self) -> Option<Duration> {
        millis(self.backend_timeout_ms)
    }

    /// Client read timeout, `None` when disabled
    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    /// Client write timeout, `None` when disabled
    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    /// Pool housekeeping settings
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            sweep_interval: Duration::from_millis(self.pool_sweep_interval_ms),
            time_to_live: Duration::from_millis(self.pool_ttl_ms),
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from an existing config (e.g. one loaded from a file)
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the request body size limit (in bytes)
    pub fn max_body_length(mut self, bytes: usize) -> Self {
        self.config.max_body_length = bytes;
        self
    }

    /// Add a backend address
    pub fn backend(mut self, addr: impl Into<String>) -> Self {
        self.config.backends.push(addr.into());
        self
    }

    /// Replace the backend list
    pub fn backends<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.backends = addrs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the backend socket timeout (in milliseconds)
    pub fn backend_timeout_ms(mut self, ms: u64) -> Self {
        self.config.backend_timeout_ms = ms;
        self
    }

    /// Set the pool sweep interval (in milliseconds)
    pub fn pool_sweep_interval_ms(mut self, ms: u64) -> Self {
        self.config.pool_sweep_interval_ms = ms;
        self
    }

    /// Set the pooled connection time-to-live (in milliseconds)
    pub fn pool_ttl_ms(mut self, ms: u64) -> Self {
        self.config.pool_ttl_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
