//! etcd-backed [`CoordinationStore`].

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, EventType, Watcher};

use crate::coordination::{CoordinationStore, WatchEvent, WatchStream};
use crate::error::{Result, ShardError};

impl From<etcd_client::Error> for ShardError {
    fn from(e: etcd_client::Error) -> Self {
        ShardError::Coordination(e.to_string())
    }
}

#[derive(Clone)]
pub struct EtcdCoordinationStore {
    client: Client,
}

impl EtcdCoordinationStore {
    pub async fn connect(endpoints: &[String], timeout: Duration) -> Result<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(timeout)
            .with_timeout(timeout);
        let client = Client::connect(endpoints, Some(options)).await?;
        tracing::debug!(?endpoints, "connected to etcd");
        Ok(Self { client })
    }
}

struct WatchState {
    // Dropping the watcher cancels the server-side watch.
    _watcher: Watcher,
    stream: etcd_client::WatchStream,
    pending: VecDeque<WatchEvent>,
    done: bool,
}

#[async_trait]
impl CoordinationStore for EtcdCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self.client.clone().get(key, None).await?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn watch(&self, key: &str) -> Result<WatchStream> {
        let (watcher, stream) = self.client.clone().watch(key, None).await?;
        tracing::debug!(%key, "watch established");

        let state = WatchState {
            _watcher: watcher,
            stream,
            pending: VecDeque::new(),
            done: false,
        };

        let events = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((Ok(event), state));
                }
                if state.done {
                    return None;
                }
                match state.stream.message().await {
                    Ok(Some(resp)) => {
                        if resp.canceled() {
                            tracing::warn!("etcd watch canceled by server");
                            state.done = true;
                            return Some((
                                Err(ShardError::Coordination("watch canceled".to_string())),
                                state,
                            ));
                        }
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            state.pending.push_back(match event.event_type() {
                                EventType::Put => WatchEvent::Put(kv.value().to_vec()),
                                EventType::Delete => WatchEvent::Delete,
                            });
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e.into()), state));
                    }
                }
            }
        });
        Ok(Box::pin(events))
    }
}
