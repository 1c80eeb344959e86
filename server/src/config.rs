//! Server configuration.

use std::str::FromStr;
use std::time::Duration;

use ratekeeper_common::{constants, RateError, Result};

/// Cache backend selector value that keeps everything in process.
pub const MEMORY_CACHE: &str = "memory";

/// Relational store configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Budget for one store round-trip, also used as the pool acquire timeout.
    pub timeout: Duration,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/ratekeeper".to_string(),
            timeout: Duration::from_millis(3000),
            max_connections: 10,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL, or `memory` for the in-process backend.
    pub url: String,
    /// Budget for one cache round-trip.
    pub timeout: Duration,
    /// Lifetime of the cached availability list.
    pub availability_ttl: Duration,
}

impl CacheConfig {
    /// Check if the in-process backend is selected.
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_CACHE
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://redis:6379".to_string(),
            timeout: Duration::from_millis(500),
            availability_ttl: constants::AVAILABILITY_TTL,
        }
    }
}

/// Upstream provider and forecast configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Exchange-rate provider base URL.
    pub exchanger_url: String,
    /// Budget for one provider call.
    pub exchanger_timeout: Duration,
    /// Forecast endpoint; forecasting is off when unset.
    pub forecast_url: Option<String>,
    /// Budget for one forecast call.
    pub forecast_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            exchanger_url: "https://api.exchangerate.host".to_string(),
            exchanger_timeout: Duration::from_millis(5000),
            forecast_url: None,
            forecast_timeout: constants::FORECAST_TIMEOUT,
        }
    }
}

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(port) = parsed(&lookup, "LISTEN_PORT")? {
            config.listen_port = port;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(ms) = parsed(&lookup, "DB_TIMEOUT_MS")? {
            config.database.timeout = Duration::from_millis(ms);
        }
        if let Some(max) = parsed(&lookup, "DB_MAX_CONNECTIONS")? {
            config.database.max_connections = max;
        }

        if let Some(url) = lookup("REDIS_URL") {
            config.cache.url = url;
        }
        if let Some(ms) = parsed(&lookup, "CACHE_TIMEOUT_MS")? {
            config.cache.timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parsed(&lookup, "AVAILABILITY_TTL_SECS")? {
            config.cache.availability_ttl = Duration::from_secs(secs);
        }

        if let Some(url) = lookup("EXCHANGER_API_URL") {
            config.upstream.exchanger_url = url;
        }
        if let Some(ms) = parsed(&lookup, "EXCHANGER_API_TIMEOUT_MS")? {
            config.upstream.exchanger_timeout = Duration::from_millis(ms);
        }
        config.upstream.forecast_url = lookup("FORECAST_API_URL").filter(|url| !url.is_empty());
        if let Some(ms) = parsed(&lookup, "FORECAST_TIMEOUT_MS")? {
            config.upstream.forecast_timeout = Duration::from_millis(ms);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(invalid("Listen port cannot be 0"));
        }

        if self.database.url.is_empty() {
            return Err(invalid("Database URL cannot be empty"));
        }

        if self.cache.url.is_empty() {
            return Err(invalid("Cache URL cannot be empty"));
        }

        if self.upstream.exchanger_url.is_empty() {
            return Err(invalid("Exchanger API URL cannot be empty"));
        }

        let timeouts = [
            ("DB_TIMEOUT_MS", self.database.timeout),
            ("CACHE_TIMEOUT_MS", self.cache.timeout),
            ("EXCHANGER_API_TIMEOUT_MS", self.upstream.exchanger_timeout),
            ("FORECAST_TIMEOUT_MS", self.upstream.forecast_timeout),
            ("AVAILABILITY_TTL_SECS", self.cache.availability_ttl),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, d)| d.is_zero()) {
            return Err(invalid(&format!("{name} cannot be 0")));
        }

        if self.upstream.forecast_timeout < self.upstream.exchanger_timeout {
            return Err(invalid("Forecast timeout cannot be shorter than the provider timeout"));
        }

        Ok(())
    }

    /// Socket address string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

fn invalid(message: &str) -> RateError {
    RateError::Configuration(message.to_string())
}

fn parsed<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(&format!("{name} has malformed value '{raw}'"))),
        None => Ok(None),
    }
}
