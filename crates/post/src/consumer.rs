use std::sync::Arc;

use async_trait::async_trait;
use bus::{Message, MessageHandler, Producer};
use common::topics::{CANCEL_DELIVERY, NEW_POST_DELIVERY};
use common::{AppError, DeliveryCancel, Shipment};
use serde::de::DeserializeOwned;

use crate::service::PostService;
use crate::store::PostStore;

/// Bus handler of the post service.
pub struct PostConsumer<S, P> {
    service: Arc<PostService<S, P>>,
}

impl<S, P> PostConsumer<S, P> {
    pub fn new(service: Arc<PostService<S, P>>) -> Self {
        Self { service }
    }

    pub fn topics() -> &'static [&'static str] {
        &[NEW_POST_DELIVERY, CANCEL_DELIVERY]
    }
}

fn decode<T: DeserializeOwned>(message: &Message) -> Result<T, AppError> {
    message
        .json()
        .map_err(|e| AppError::bad_request(format!("invalid {} payload: {e}", message.topic)))
}

#[async_trait]
impl<S, P> MessageHandler for PostConsumer<S, P>
where
    S: PostStore + 'static,
    P: Producer + 'static,
{
    type Error = AppError;

    async fn handle(&self, message: &Message) -> Result<(), AppError> {
        match message.topic.as_str() {
            NEW_POST_DELIVERY => {
                let shipment: Shipment = decode(message)?;
                self.service.register_delivery(&shipment).await
            }
            CANCEL_DELIVERY => {
                let cancel: DeliveryCancel = decode(message)?;
                self.service.delete_delivery(&cancel.shipment_id).await
            }
            _ => Ok(()),
        }
    }
}
