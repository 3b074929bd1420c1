//! Opening and closing shard connections.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Mutex;

use crate::error::{Result, ShardError};

/// Opens connections to shard servers.
///
/// The router only clones connections and hands them back for closing, so
/// `Conn` should be a cheap handle (a pool, an `Arc`).
#[async_trait]
pub trait ShardConnector: Send + Sync + 'static {
    type Conn: Clone + Send + Sync + 'static;

    /// Opens a connection to `server` at `endpoint`.
    async fn connect(&self, server: &str, endpoint: &str) -> Result<Self::Conn>;

    /// Closes a connection previously returned by `connect`.
    async fn close(&self, conn: Self::Conn);
}

/// Postgres connection pools, one per shard server.
#[derive(Debug, Clone)]
pub struct PgConnector {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnector {
    pub fn new(max_connections: u32) -> Self {
        Self {
            max_connections,
            ..Self::default()
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for PgConnector {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl ShardConnector for PgConnector {
    type Conn = PgPool;

    async fn connect(&self, server: &str, endpoint: &str) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(endpoint)
            .await
            .map_err(|e| ShardError::Connect {
                server: server.to_string(),
                reason: e.to_string(),
            })
    }

    async fn close(&self, conn: PgPool) {
        conn.close().await;
    }
}

#[derive(Debug)]
struct MemoryConnectorState<T> {
    shards: HashMap<String, Arc<T>>,
    failing: HashSet<String>,
    opened: usize,
    closed: usize,
}

impl<T> Default for MemoryConnectorState<T> {
    fn default() -> Self {
        Self {
            shards: HashMap::new(),
            failing: HashSet::new(),
            opened: 0,
            closed: 0,
        }
    }
}

/// In-memory connector for testing.
///
/// Each endpoint is a process-local "database" of type `T`; connecting twice
/// to the same endpoint yields the same shared instance, like two pools
/// against one server.
#[derive(Debug)]
pub struct MemoryConnector<T> {
    state: Arc<Mutex<MemoryConnectorState<T>>>,
}

impl<T> Clone for MemoryConnector<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for MemoryConnector<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryConnectorState::default())),
        }
    }
}

impl<T: Default + Send + Sync + 'static> MemoryConnector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes connecting to `endpoint` fail (or succeed again).
    pub async fn set_fail_on_connect(&self, endpoint: &str, fail: bool) {
        let mut state = self.state.lock().await;
        if fail {
            state.failing.insert(endpoint.to_string());
        } else {
            state.failing.remove(endpoint);
        }
    }

    /// The database behind `endpoint`, created on first use.
    pub async fn shard(&self, endpoint: &str) -> Arc<T> {
        self.state
            .lock()
            .await
            .shards
            .entry(endpoint.to_string())
            .or_default()
            .clone()
    }

    pub async fn opened_count(&self) -> usize {
        self.state.lock().await.opened
    }

    pub async fn closed_count(&self) -> usize {
        self.state.lock().await.closed
    }
}

#[async_trait]
impl<T: Default + Send + Sync + 'static> ShardConnector for MemoryConnector<T> {
    type Conn = Arc<T>;

    async fn connect(&self, server: &str, endpoint: &str) -> Result<Arc<T>> {
        let mut state = self.state.lock().await;
        if state.failing.contains(endpoint) {
            return Err(ShardError::Connect {
                server: server.to_string(),
                reason: format!("connection refused: {endpoint}"),
            });
        }
        state.opened += 1;
        Ok(state
            .shards
            .entry(endpoint.to_string())
            .or_default()
            .clone())
    }

    async fn close(&self, _conn: Arc<T>) {
        self.state.lock().await.closed += 1;
    }
}
