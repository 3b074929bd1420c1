use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Publishes raw payloads.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Appends `payload` to `topic`. Messages sharing a `key` land on the same
    /// partition and keep their relative order.
    async fn send(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()>;
}

/// JSON convenience on top of [`Producer`].
#[async_trait]
pub trait ProducerExt: Producer {
    async fn send_json<T>(&self, topic: &str, key: Option<&str>, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, key, payload).await
    }
}

impl<P: Producer + ?Sized> ProducerExt for P {}

#[async_trait]
impl<P: Producer + ?Sized> Producer for std::sync::Arc<P> {
    async fn send(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()> {
        (**self).send(topic, key, payload).await
    }
}
