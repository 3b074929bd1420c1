use bus::{Producer, ProducerExt};
use chrono::Utc;
use common::topics::{CANCEL_DELIVERY, REMOVE_RESERVE};
use common::{AppError, DeliveryCancel, Result, Shipment};

use crate::IncomeDelivery;
use crate::store::PostStore;

/// Post side of the delivery saga.
pub struct PostService<S, P> {
    store: S,
    producer: P,
}

impl<S, P> PostService<S, P>
where
    S: PostStore,
    P: Producer,
{
    pub fn new(store: S, producer: P) -> Self {
        Self { store, producer }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records the shipment at its destination post and asks the offer
    /// service to release the reservation.
    ///
    /// A failed save or a failed `remove_reserve` publish cancels the delivery
    /// instead. Both return an error so the consumer counts the failure.
    #[tracing::instrument(skip(self, shipment), fields(shipment_id = %shipment.id))]
    pub async fn register_delivery(&self, shipment: &Shipment) -> Result<()> {
        let delivery = IncomeDelivery {
            post_id: shipment.destination_id,
            shipment_id: shipment.id.clone(),
            created_time: Utc::now(),
        };

        if let Err(e) = self.store.save_delivery(&delivery).await {
            tracing::error!(error = %e, "failed to save income delivery");
            self.send_cancel(&shipment.id).await;
            return Err(e);
        }

        if let Err(e) = self
            .producer
            .send_json(REMOVE_RESERVE, Some(&shipment.id), shipment)
            .await
        {
            tracing::error!(error = %e, "failed to publish remove reserve");
            self.send_cancel(&shipment.id).await;
            return Err(AppError::internal("Unexpected bus error"));
        }

        metrics::counter!("post_deliveries_registered_total").increment(1);
        tracing::info!(post_id = delivery.post_id, "income delivery registered");
        Ok(())
    }

    /// Compensation: forgets the delivery of `shipment_id`, if any.
    #[tracing::instrument(skip(self))]
    pub async fn delete_delivery(&self, shipment_id: &str) -> Result<()> {
        self.store.remove_delivery(shipment_id).await?;
        tracing::info!("income delivery removed");
        Ok(())
    }

    async fn send_cancel(&self, shipment_id: &str) {
        metrics::counter!("saga_compensations_total", "service" => "post").increment(1);
        let cancel = DeliveryCancel::new(shipment_id);
        if let Err(e) = self
            .producer
            .send_json(CANCEL_DELIVERY, Some(shipment_id), &cancel)
            .await
        {
            tracing::error!(%shipment_id, error = %e, "failed to publish delivery cancel");
        }
    }
}

#[cfg(test)]
mod tests {
    use bus::InMemoryBus;
    use common::{OrderId, ShipmentStatus, Unit};

    use super::*;
    use crate::memory::InMemoryPostStore;

    fn service() -> (PostService<InMemoryPostStore, InMemoryBus>, InMemoryBus) {
        let bus = InMemoryBus::new(1);
        (PostService::new(InMemoryPostStore::new(), bus.clone()), bus)
    }

    fn shipment(id: &str) -> Shipment {
        Shipment {
            id: id.to_string(),
            order_id: OrderId::new_unchecked("5-1"),
            seller_id: 3,
            units: vec![Unit::new("O9", 2)],
            destination_id: 77,
            status: ShipmentStatus::AcceptDelivery,
            created_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_register_saves_and_forwards() {
        let (service, bus) = service();
        let shipment = shipment("sh-1");

        service.register_delivery(&shipment).await.unwrap();

        let stored = service.store().get_delivery("sh-1").await.unwrap().unwrap();
        assert_eq!(stored.post_id, 77);
        let sent = bus.messages(REMOVE_RESERVE);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key.as_deref(), Some("sh-1"));
        assert_eq!(sent[0].json::<Shipment>().unwrap(), shipment);
        assert!(bus.messages(CANCEL_DELIVERY).is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_cancels() {
        let (service, bus) = service();
        service.store().set_fail_on_save(true);

        let err = service.register_delivery(&shipment("sh-1")).await.unwrap_err();
        assert_eq!(err.status_code(), 500);

        assert!(bus.messages(REMOVE_RESERVE).is_empty());
        let cancels = bus.messages(CANCEL_DELIVERY);
        assert_eq!(cancels.len(), 1);
        assert_eq!(
            cancels[0].json::<DeliveryCancel>().unwrap(),
            DeliveryCancel::new("sh-1")
        );
    }

    #[tokio::test]
    async fn test_publish_failure_cancels() {
        let (service, bus) = service();
        bus.set_fail_on_publish(REMOVE_RESERVE, true);

        assert!(service.register_delivery(&shipment("sh-1")).await.is_err());
        assert_eq!(bus.messages(CANCEL_DELIVERY).len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_cancels() {
        let (service, bus) = service();
        service.register_delivery(&shipment("sh-1")).await.unwrap();

        let err = service.register_delivery(&shipment("sh-1")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(bus.messages(REMOVE_RESERVE).len(), 1);
        assert_eq!(bus.messages(CANCEL_DELIVERY).len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (service, _) = service();
        service.register_delivery(&shipment("sh-1")).await.unwrap();

        service.delete_delivery("sh-1").await.unwrap();
        service.delete_delivery("sh-1").await.unwrap();
        service.delete_delivery("never").await.unwrap();
        assert_eq!(service.store().delivery_count(), 0);

        // A cancelled delivery may be registered again.
        service.register_delivery(&shipment("sh-1")).await.unwrap();
        assert_eq!(service.store().delivery_count(), 1);
    }
}
