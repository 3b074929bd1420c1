use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Cache;
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
struct InMemoryCacheState {
    entries: HashMap<String, Vec<u8>>,
    fail_on_get: bool,
    fail_on_set: bool,
    fail_on_invalidate: bool,
    hits: u64,
    misses: u64,
}

/// Process-local cache storing JSON-encoded values, like a remote key/value
/// backend would.
#[derive(Debug)]
pub struct InMemoryCache<V> {
    state: Arc<RwLock<InMemoryCacheState>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for InMemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryCacheState::default())),
            _value: PhantomData,
        }
    }
}

impl<V> InMemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryCacheState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryCacheState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.write().fail_on_get = fail;
    }

    pub fn set_fail_on_set(&self, fail: bool) {
        self.write().fail_on_set = fail;
    }

    pub fn set_fail_on_invalidate(&self, fail: bool) {
        self.write().fail_on_invalidate = fail;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.read().hits
    }

    pub fn misses(&self) -> u64 {
        self.read().misses
    }
}

#[async_trait]
impl<V> Cache<V> for InMemoryCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<V> {
        let mut state = self.write();
        if state.fail_on_get {
            return Err(CacheError::Backend("connection reset".to_string()));
        }
        match state.entries.get(key) {
            Some(raw) => {
                let value = serde_json::from_slice(raw)?;
                state.hits += 1;
                Ok(value)
            }
            None => {
                state.misses += 1;
                Err(CacheError::Miss)
            }
        }
    }

    async fn set(&self, key: &str, value: &V) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        let mut state = self.write();
        if state.fail_on_set {
            return Err(CacheError::Backend("connection reset".to_string()));
        }
        state.entries.insert(key.to_string(), raw);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        let mut state = self.write();
        if state.fail_on_invalidate {
            return Err(CacheError::Backend("connection reset".to_string()));
        }
        state.entries.remove(key);
        Ok(())
    }
}
