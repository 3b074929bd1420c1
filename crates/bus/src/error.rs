use thiserror::Error;

/// Errors raised by producers and consumers.
#[derive(Debug, Error)]
pub enum BusError {
    /// The message could not be appended to the topic.
    #[error("Failed to publish to '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// The payload could not be encoded.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Another consumer is already attached to this group.
    #[error("Consumer group '{0}' already has an active subscription")]
    GroupInUse(String),

    /// A subscription must name at least one topic.
    #[error("Subscription for group '{0}' names no topics")]
    NoTopics(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
