//! Keeps a [`ShardRouter`] in step with the topology document.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::connector::ShardConnector;
use crate::coordination::{CoordinationStore, WatchEvent, WatchStream};
use crate::error::{Result, ShardError};
use crate::router::ShardRouter;
use crate::topology::ShardTopology;

/// Follows one key in the coordination store and reconfigures the router on
/// every update.
///
/// A bad document or a failed reconfiguration is logged and the router keeps
/// its previous topology. Deleting the key is ignored. A lost subscription is
/// re-established after `retry_delay`.
pub struct TopologyWatcher<C: ShardConnector, S> {
    router: Arc<ShardRouter<C>>,
    store: Arc<S>,
    key: String,
    retry_delay: Duration,
}

impl<C, S> TopologyWatcher<C, S>
where
    C: ShardConnector,
    S: CoordinationStore + 'static,
{
    pub fn new(router: Arc<ShardRouter<C>>, store: Arc<S>, key: impl Into<String>) -> Self {
        Self {
            router,
            store,
            key: key.into(),
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Starts watching, then loads and applies the current topology.
    ///
    /// The subscription is opened before the read so an update landing in
    /// between is replayed by the watch loop. Fails if the key is absent or
    /// the initial topology cannot be applied; the service cannot route
    /// anything without it. The router holds no connections after a failure.
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub async fn start(self) -> Result<TopologyWatcherHandle> {
        let stream = self.store.watch(&self.key).await?;
        if let Err(e) = self.load_initial().await {
            self.router.close_all().await;
            return Err(e);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stream, stop_rx));

        Ok(TopologyWatcherHandle {
            stop_tx: Some(stop_tx),
            task,
        })
    }

    async fn load_initial(&self) -> Result<()> {
        let raw = self
            .store
            .get(&self.key)
            .await?
            .ok_or_else(|| ShardError::TopologyMissing(self.key.clone()))?;
        let topology = ShardTopology::from_json(&raw)?;
        self.router.reconfigure(&topology).await?;
        tracing::info!("initial shard topology:\n{topology}");
        Ok(())
    }

    async fn run(self, mut stream: WatchStream, mut stop_rx: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                next = stream.next() => match next {
                    Some(Ok(WatchEvent::Put(raw))) => self.apply(&raw).await,
                    Some(Ok(WatchEvent::Delete)) => {
                        tracing::warn!(key = %self.key, "topology key deleted, keeping current topology");
                    }
                    Some(Err(e)) => {
                        tracing::error!(key = %self.key, error = %e, "topology watch failed, resubscribing");
                        match self.resubscribe(&mut stop_rx).await {
                            Some(s) => stream = s,
                            None => break,
                        }
                    }
                    None => {
                        tracing::warn!(key = %self.key, "topology watch ended, resubscribing");
                        match self.resubscribe(&mut stop_rx).await {
                            Some(s) => stream = s,
                            None => break,
                        }
                    }
                },
            }
        }

        tracing::info!(key = %self.key, "topology watcher stopped, closing shard connections");
        self.router.close_all().await;
    }

    async fn apply(&self, raw: &[u8]) {
        let topology = match ShardTopology::from_json(raw) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "ignoring malformed topology update");
                return;
            }
        };
        match self.router.reconfigure(&topology).await {
            Ok(()) => tracing::info!("shard topology changed:\n{topology}"),
            Err(e) => tracing::error!(error = %e, "topology update rejected"),
        }
    }

    /// Retries `watch` until it succeeds. `None` means stop was requested.
    async fn resubscribe(&self, stop_rx: &mut oneshot::Receiver<()>) -> Option<WatchStream> {
        loop {
            tokio::select! {
                _ = &mut *stop_rx => return None,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            match self.store.watch(&self.key).await {
                Ok(stream) => {
                    tracing::info!(key = %self.key, "topology watch re-established");
                    return Some(stream);
                }
                Err(e) => tracing::warn!(key = %self.key, error = %e, "resubscribe failed"),
            }
        }
    }
}

/// Stops a running [`TopologyWatcher`].
pub struct TopologyWatcherHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TopologyWatcherHandle {
    /// Ends the watch loop and closes every shard connection.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "topology watcher task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
