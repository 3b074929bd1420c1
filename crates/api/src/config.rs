//! Application configuration loaded from environment variables.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process configuration.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:8080`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `ETCD_ENDPOINTS`: comma separated (default `http://127.0.0.1:2379`)
/// - `SHIPMENT_CLUSTER_KEY`: key holding the shard topology (default `shipment_cluster`)
/// - `OFFER_DATABASE_URL`, `POST_DATABASE_URL`: required
/// - `SHARD_MAX_CONNECTIONS`: pool size per shard (default `5`)
/// - `UNKEYED_QUERY_TIMEOUT_MS`: scatter-gather deadline, `0` disables it (default `5000`)
/// - `BUS_PARTITIONS`: partitions per topic (default `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub etcd_endpoints: Vec<String>,
    pub shipment_cluster_key: String,
    pub offer_database_url: String,
    pub post_database_url: String,
    pub shard_max_connections: u32,
    pub unkeyed_query_timeout: Option<Duration>,
    pub bus_partitions: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |var: &str, default: &str| lookup(var).unwrap_or_else(|| default.to_string());
        let required = |var: &'static str| lookup(var).ok_or(ConfigError::Missing(var));

        let log_format = match or("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        let timeout_ms: u64 = parse(&lookup, "UNKEYED_QUERY_TIMEOUT_MS", 5000)?;

        Ok(Self {
            host: or("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 8080)?,
            log_level: or("RUST_LOG", "info"),
            log_format,
            etcd_endpoints: or("ETCD_ENDPOINTS", "http://127.0.0.1:2379")
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect(),
            shipment_cluster_key: or("SHIPMENT_CLUSTER_KEY", "shipment_cluster"),
            offer_database_url: required("OFFER_DATABASE_URL")?,
            post_database_url: required("POST_DATABASE_URL")?,
            shard_max_connections: parse(&lookup, "SHARD_MAX_CONNECTIONS", 5)?,
            unkeyed_query_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            bus_partitions: parse(&lookup, "BUS_PARTITIONS", 3)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
