use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is not cached.
    #[error("Cache miss")]
    Miss,

    /// A cached value could not be encoded or decoded.
    #[error("Cache codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The backend failed.
    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
