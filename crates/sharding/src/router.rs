//! Key-to-connection routing over a replaceable shard map.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::connector::ShardConnector;
use crate::error::{Result, ShardError};
use crate::map::ShardMap;
use crate::topology::ShardTopology;

/// Routes keys to shard connections.
///
/// The active [`ShardMap`] sits behind a read/write lock: `resolve` takes the
/// shared side, `reconfigure` the exclusive side only for the pointer swap.
/// A caller therefore sees either the whole old map or the whole new one.
/// Connections of a replaced map are closed after the swap; a caller still
/// holding one of them may see its query fail.
pub struct ShardRouter<C: ShardConnector> {
    connector: C,
    map: RwLock<Arc<ShardMap<C::Conn>>>,
    unkeyed_timeout: Option<Duration>,
}

impl<C: ShardConnector> ShardRouter<C> {
    /// Creates a router with an empty topology.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            map: RwLock::new(Arc::new(ShardMap::default())),
            unkeyed_timeout: None,
        }
    }

    /// Deadline applied to every [`ShardRouter::query_unkeyed`] call.
    pub fn with_unkeyed_timeout(mut self, timeout: Duration) -> Self {
        self.unkeyed_timeout = Some(timeout);
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The currently active map.
    pub async fn snapshot(&self) -> Arc<ShardMap<C::Conn>> {
        self.map.read().await.clone()
    }

    /// Connection owning `key` under the active topology.
    pub async fn resolve(&self, key: &str) -> Result<C::Conn> {
        let map = self.map.read().await;
        map.resolve(key)
    }

    pub async fn bucket_for(&self, key: &str) -> Option<u32> {
        self.map.read().await.bucket_for(key)
    }

    /// Names of the active servers.
    pub async fn servers(&self) -> Vec<String> {
        self.map
            .read()
            .await
            .servers()
            .map(str::to_string)
            .collect()
    }

    /// Replaces the active topology.
    ///
    /// Every server is connected first. If any connection fails, the ones
    /// already opened are closed and the active map is left untouched.
    #[tracing::instrument(skip_all, fields(servers = topology.servers.len(), buckets = topology.buckets.len()))]
    pub async fn reconfigure(&self, topology: &ShardTopology) -> Result<()> {
        tracing::info!("updating shard topology");

        let dangling = topology.dangling_buckets();
        if !dangling.is_empty() {
            tracing::warn!(?dangling, "buckets reference unknown servers");
        }

        let mut opened = BTreeMap::new();
        for (server, endpoint) in &topology.servers {
            match self.connector.connect(server, endpoint).await {
                Ok(conn) => {
                    opened.insert(server.clone(), conn);
                }
                Err(e) => {
                    tracing::error!(%server, error = %e, "shard connection failed, keeping previous topology");
                    for conn in opened.into_values() {
                        self.connector.close(conn).await;
                    }
                    metrics::counter!("shard_reconfigurations_total", "result" => "failed")
                        .increment(1);
                    return Err(e);
                }
            }
        }

        let next = Arc::new(ShardMap::new(topology.buckets.clone(), opened));
        let previous = {
            let mut active = self.map.write().await;
            std::mem::replace(&mut *active, next)
        };
        self.close_map(&previous).await;

        metrics::counter!("shard_reconfigurations_total", "result" => "applied").increment(1);
        tracing::info!("shard topology updated");
        Ok(())
    }

    /// Drops the active topology and closes its connections.
    pub async fn close_all(&self) {
        let previous = {
            let mut active = self.map.write().await;
            std::mem::take(&mut *active)
        };
        self.close_map(&previous).await;
    }

    async fn close_map(&self, map: &ShardMap<C::Conn>) {
        for (server, conn) in map.connections() {
            tracing::debug!(%server, "closing shard connection");
            self.connector.close(conn.clone()).await;
        }
    }

    /// Runs `query` against every active shard and expects exactly one row.
    ///
    /// Zero rows gives [`ShardError::NotFound`], two or more
    /// [`ShardError::AmbiguousResult`]. The remaining shard tasks are aborted
    /// as soon as a second row or an error shows up, or when the configured
    /// deadline passes.
    #[tracing::instrument(skip_all)]
    pub async fn query_unkeyed<T, F, Fut>(&self, query: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(String, C::Conn) -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let started = Instant::now();
        let snapshot = self.snapshot().await;

        let mut tasks = JoinSet::new();
        for (server, conn) in snapshot.connections() {
            tasks.spawn(query(server.to_string(), conn.clone()));
        }
        drop(snapshot);

        let result = match self.unkeyed_timeout {
            Some(limit) => tokio::time::timeout(limit, expect_single(&mut tasks))
                .await
                .unwrap_or(Err(ShardError::Timeout(limit))),
            None => expect_single(&mut tasks).await,
        };
        tasks.abort_all();

        metrics::histogram!("shard_unkeyed_query_seconds").record(started.elapsed().as_secs_f64());
        if let Err(ShardError::AmbiguousResult) = result {
            tracing::error!("unkeyed lookup matched more than one shard");
        }
        result
    }
}

async fn expect_single<T: 'static>(tasks: &mut JoinSet<Result<Option<T>>>) -> Result<T> {
    let mut found = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(Some(row))) => {
                if found.is_some() {
                    return Err(ShardError::AmbiguousResult);
                }
                found = Some(row);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(ShardError::Task(e.to_string())),
        }
    }
    found.ok_or(ShardError::NotFound)
}
