use std::sync::Arc;

use async_trait::async_trait;
use bus::{Message, MessageHandler, Producer};
use common::topics::{CANCEL_DELIVERY, COMMIT_DELIVERY, NEW_SHIPMENT_DELIVERY};
use common::{AppError, DeliveryCancel, Shipment};
use serde::de::DeserializeOwned;

use crate::service::ShipmentService;
use crate::store::ShipmentStore;

/// Bus handler of the shipment service.
pub struct ShipmentConsumer<S, P> {
    service: Arc<ShipmentService<S, P>>,
}

impl<S, P> ShipmentConsumer<S, P> {
    pub fn new(service: Arc<ShipmentService<S, P>>) -> Self {
        Self { service }
    }

    pub fn topics() -> &'static [&'static str] {
        &[COMMIT_DELIVERY, NEW_SHIPMENT_DELIVERY, CANCEL_DELIVERY]
    }
}

fn decode<T: DeserializeOwned>(message: &Message) -> Result<T, AppError> {
    message
        .json()
        .map_err(|e| AppError::bad_request(format!("invalid {} payload: {e}", message.topic)))
}

#[async_trait]
impl<S, P> MessageHandler for ShipmentConsumer<S, P>
where
    S: ShipmentStore + 'static,
    P: Producer + 'static,
{
    type Error = AppError;

    async fn handle(&self, message: &Message) -> Result<(), AppError> {
        match message.topic.as_str() {
            NEW_SHIPMENT_DELIVERY => {
                let shipment: Shipment = decode(message)?;
                self.service.accept_delivery(&shipment).await
            }
            COMMIT_DELIVERY => {
                let shipment: Shipment = decode(message)?;
                self.service.commit_delivery(&shipment).await
            }
            CANCEL_DELIVERY => {
                let cancel: DeliveryCancel = decode(message)?;
                self.service.cancel_delivery(&cancel.shipment_id).await
            }
            _ => Ok(()),
        }
    }
}
