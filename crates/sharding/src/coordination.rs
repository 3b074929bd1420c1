//! Access to the coordination store holding the topology document.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::mpsc;

use crate::error::{Result, ShardError};

/// A change to a watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put(Vec<u8>),
    Delete,
}

/// Stream of changes for one key. Ends when the subscription is lost.
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent>> + Send>>;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Current value of `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Subscribes to changes of `key` made after this call.
    async fn watch(&self, key: &str) -> Result<WatchStream>;
}

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, Vec<u8>>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<Result<WatchEvent>>>>,
    fail_on_watch: bool,
}

/// In-memory coordination store for testing.
#[derive(Clone, Default)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        let mut state = self.lock();
        state.values.insert(key.to_string(), value.clone());
        Self::notify(&mut state, key, WatchEvent::Put(value));
    }

    pub fn delete(&self, key: &str) {
        let mut state = self.lock();
        state.values.remove(key);
        Self::notify(&mut state, key, WatchEvent::Delete);
    }

    /// Ends every open watch stream, as a lost connection would.
    pub fn break_watches(&self) {
        self.lock().watchers.clear();
    }

    /// Makes `watch` fail (or succeed again).
    pub fn set_fail_on_watch(&self, fail: bool) {
        self.lock().fail_on_watch = fail;
    }

    /// Number of live subscriptions on `key`.
    pub fn watcher_count(&self, key: &str) -> usize {
        self.lock()
            .watchers
            .get(key)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // No code path panics while holding the lock.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(state: &mut MemoryState, key: &str, event: WatchEvent) {
        if let Some(senders) = state.watchers.get_mut(key) {
            senders.retain(|tx| tx.send(Ok(event.clone())).is_ok());
        }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().values.get(key).cloned())
    }

    async fn watch(&self, key: &str) -> Result<WatchStream> {
        let mut state = self.lock();
        if state.fail_on_watch {
            return Err(ShardError::Coordination("watch refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.watchers.entry(key.to_string()).or_default().push(tx);

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(Box::pin(stream))
    }
}
