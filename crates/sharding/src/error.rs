use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while routing or reconfiguring shards.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The bucket or its server is absent from the active topology.
    #[error("Shard unavailable: {0}")]
    ShardUnavailable(String),

    /// No shard returned a row for an unkeyed lookup.
    #[error("Not found")]
    NotFound,

    /// More than one shard returned a row for an unkeyed lookup.
    #[error("More than one row found across shards")]
    AmbiguousResult,

    /// Opening a connection to a shard server failed.
    #[error("Failed to connect to shard server '{server}': {reason}")]
    Connect { server: String, reason: String },

    /// A query against a shard failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An unkeyed lookup did not complete before its deadline.
    #[error("Unkeyed query did not complete within {0:?}")]
    Timeout(Duration),

    /// A per-shard query task panicked or was cancelled.
    #[error("Shard query task failed: {0}")]
    Task(String),

    /// The topology document could not be decoded.
    #[error("Invalid shard topology: {0}")]
    Decode(#[from] serde_json::Error),

    /// The topology key does not exist in the coordination store.
    #[error("Shard topology not found under key '{0}'")]
    TopologyMissing(String),

    /// The coordination store failed.
    #[error("Coordination store error: {0}")]
    Coordination(String),
}

/// Convenience type alias for routing results.
pub type Result<T> = std::result::Result<T, ShardError>;
