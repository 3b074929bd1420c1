//! Cache capability consumed by read-through stores.
//!
//! Backends only have to answer `get`, `set` and `invalidate`. A miss is a
//! distinct error variant so callers can tell "not cached" apart from
//! "cache broken".

pub mod error;
pub mod memory;

use async_trait::async_trait;

pub use error::{CacheError, Result};
pub use memory::InMemoryCache;

#[async_trait]
pub trait Cache<V>: Send + Sync {
    /// Cached value for `key`, or [`CacheError::Miss`].
    async fn get(&self, key: &str) -> Result<V>;

    async fn set(&self, key: &str, value: &V) -> Result<()>;

    /// Drops `key`. Invalidating an absent key succeeds.
    async fn invalidate(&self, key: &str) -> Result<()>;
}
