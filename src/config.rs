//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8081".parse().unwrap()
}

/// Which storage backend holds per-client limiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process map, state local to this instance
    Memory,
    /// Shared Redis cache
    Redis,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests a client may issue per window
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Window length in seconds; a client's bucket resets this long after
    /// it was created
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Storage backend for limiter state
    #[serde(default = "default_backend")]
    pub backend: Backend,

    /// Redis connection settings, required when `backend` is `redis`
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            window_secs: default_window_secs(),
            backend: default_backend(),
            redis: None,
        }
    }
}

impl RateLimitingConfig {
    /// The configured window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_capacity() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

fn default_backend() -> Backend {
    Backend::Memory
}

/// Redis backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis host
    pub host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Redis password, if the server requires one
    #[serde(default)]
    pub password: Option<String>,
}

fn default_redis_port() -> u16 {
    6379
}

impl RedisConfig {
    /// Build the connection URL for this configuration.
    pub fn url(&self) -> String {
        match &self.password {
            Some(pass) => format!("redis://:{}@{}:{}", pass, self.host, self.port),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TollgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TollgateError::Config(e.to_string()))?;
        Ok(config)
    }
}
