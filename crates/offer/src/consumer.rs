use std::sync::Arc;

use async_trait::async_trait;
use bus::{Message, MessageHandler, Producer};
use common::topics::REMOVE_RESERVE;
use common::{AppError, Shipment};

use crate::service::OfferService;
use crate::store::OfferStore;

/// Bus handler of the offer service.
pub struct OfferConsumer<S, P> {
    service: Arc<OfferService<S, P>>,
}

impl<S, P> OfferConsumer<S, P> {
    pub fn new(service: Arc<OfferService<S, P>>) -> Self {
        Self { service }
    }

    /// Topics this consumer reacts to.
    pub fn topics() -> &'static [&'static str] {
        &[REMOVE_RESERVE]
    }
}

#[async_trait]
impl<S, P> MessageHandler for OfferConsumer<S, P>
where
    S: OfferStore + 'static,
    P: Producer + 'static,
{
    type Error = AppError;

    async fn handle(&self, message: &Message) -> Result<(), AppError> {
        match message.topic.as_str() {
            REMOVE_RESERVE => {
                let shipment: Shipment = message
                    .json()
                    .map_err(|e| AppError::bad_request(format!("invalid shipment payload: {e}")))?;
                self.service.remove_reserved(&shipment).await
            }
            other => {
                tracing::debug!(topic = other, "ignoring message");
                Ok(())
            }
        }
    }
}
