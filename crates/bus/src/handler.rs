use std::fmt::Display;

use async_trait::async_trait;

use crate::message::Message;

/// Processes messages delivered to a consumer group.
///
/// An error is logged by the consumer and the message is still committed; it
/// is not redelivered.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Error: Display + Send;

    async fn handle(&self, message: &Message) -> Result<(), Self::Error>;
}
