use bus::{Producer, ProducerExt};
use common::topics::{CANCEL_DELIVERY, COMMIT_DELIVERY};
use common::{AppError, DeliveryCancel, Result, Shipment};

use crate::model::Offer;
use crate::store::OfferStore;

/// Offer operations and the reservation-release saga step.
pub struct OfferService<S, P> {
    store: S,
    producer: P,
}

impl<S, P> OfferService<S, P>
where
    S: OfferStore,
    P: Producer,
{
    pub fn new(store: S, producer: P) -> Self {
        Self { store, producer }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_offer(
        &self,
        seller_id: i64,
        product_id: i64,
        stock: i64,
        price: f64,
    ) -> Result<Offer> {
        if stock < 0 {
            return Err(AppError::bad_request("stock must not be negative"));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::bad_request("price must be a non-negative number"));
        }

        let seq = self.store.next_id().await?;
        let offer = Offer {
            id: Offer::format_id(seq, seller_id, product_id),
            seller_id,
            product_id,
            price,
            stock,
            reserved: 0,
        };
        self.store.save_offer(&offer).await?;
        tracing::info!(offer_id = %offer.id, "offer created");
        Ok(offer)
    }

    pub async fn get_offer(&self, offer_id: &str) -> Result<Offer> {
        self.store.get_offer(offer_id).await
    }

    pub async fn get_price(&self, offer_id: &str) -> Result<f64> {
        Ok(self.store.get_offer(offer_id).await?.price)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_price(&self, offer_id: &str, price: f64) -> Result<Offer> {
        self.store
            .update_offer(offer_id, move |mut o| {
                o.price = price;
                o
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_stock(&self, offer_id: &str, stock: i64) -> Result<Offer> {
        self.store
            .update_offer(offer_id, move |mut o| {
                o.stock = stock;
                o
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_reserve(&self, offer_id: &str, reserved: i64) -> Result<Offer> {
        self.store
            .update_offer(offer_id, move |mut o| {
                o.reserved = reserved;
                o
            })
            .await
    }

    /// Releases the reservation held by `shipment`.
    ///
    /// On success the shipment is forwarded to `commit_delivery`. On failure
    /// a `cancel_delivery` is sent and the storage error is returned. The
    /// call is not idempotent: handling the same shipment twice decrements
    /// twice.
    #[tracing::instrument(skip(self, shipment), fields(shipment_id = %shipment.id))]
    pub async fn remove_reserved(&self, shipment: &Shipment) -> Result<()> {
        tracing::info!("removing reserve for shipment");
        let counts = shipment.unit_counts();

        if let Err(e) = self.store.remove_reserved(&counts).await {
            tracing::warn!(error = %e, "reservation release failed, cancelling delivery");
            self.send_cancel(&shipment.id).await;
            return Err(e);
        }
        metrics::counter!("offer_reservations_released_total").increment(1);

        self.producer
            .send_json(COMMIT_DELIVERY, Some(&shipment.id), shipment)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to publish delivery commit");
                AppError::internal("Unexpected bus error")
            })
    }

    async fn send_cancel(&self, shipment_id: &str) {
        metrics::counter!("saga_compensations_total", "service" => "offer").increment(1);
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
    use chrono::Utc;
    use common::{OrderId, ShipmentStatus, Unit};

    use super::*;
    use crate::memory::InMemoryOfferStore;

    fn service() -> (OfferService<InMemoryOfferStore, InMemoryBus>, InMemoryBus) {
        let bus = InMemoryBus::new(1);
        (OfferService::new(InMemoryOfferStore::new(), bus.clone()), bus)
    }

    fn shipment(units: Vec<Unit>) -> Shipment {
        Shipment {
            id: "ship-1".to_string(),
            order_id: OrderId::new_unchecked("5-1"),
            seller_id: 3,
            units,
            destination_id: 77,
            status: ShipmentStatus::AcceptDelivery,
            created_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_offer_assigns_composite_id() {
        let (service, _) = service();
        let first = service.create_offer(3, 7, 10, 12.5).await.unwrap();
        let second = service.create_offer(3, 8, 1, 1.0).await.unwrap();

        assert_eq!(first.id, "1-3-7");
        assert_eq!(second.id, "2-3-8");
        assert_eq!(first.reserved, 0);
        assert_eq!(service.get_price("1-3-7").await.unwrap(), 12.5);
    }

    #[tokio::test]
    async fn test_create_offer_validation() {
        let (service, _) = service();
        assert_eq!(
            service.create_offer(1, 1, -1, 1.0).await.unwrap_err().status_code(),
            400
        );
        assert_eq!(
            service.create_offer(1, 1, 1, f64::NAN).await.unwrap_err().status_code(),
            400
        );
    }

    #[tokio::test]
    async fn test_updates() {
        let (service, _) = service();
        let offer = service.create_offer(1, 1, 10, 5.0).await.unwrap();

        assert_eq!(service.update_price(&offer.id, 6.0).await.unwrap().price, 6.0);
        assert_eq!(service.update_stock(&offer.id, 20).await.unwrap().stock, 20);
        let updated = service.update_reserve(&offer.id, 4).await.unwrap();
        assert_eq!((updated.price, updated.stock, updated.reserved), (6.0, 20, 4));
        assert!(service.update_price("0-0-0", 1.0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_reserved_commits() {
        let (service, bus) = service();
        let offer = service.create_offer(3, 9, 10, 1.0).await.unwrap();
        service.update_reserve(&offer.id, 5).await.unwrap();

        let shipment = shipment(vec![Unit::new(&offer.id, 2)]);
        service.remove_reserved(&shipment).await.unwrap();

        assert_eq!(service.get_offer(&offer.id).await.unwrap().reserved, 3);
        let commits = bus.messages(COMMIT_DELIVERY);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].json::<Shipment>().unwrap(), shipment);
        assert!(bus.messages(CANCEL_DELIVERY).is_empty());
    }

    #[tokio::test]
    async fn test_remove_reserved_failure_cancels() {
        let (service, bus) = service();
        let offer = service.create_offer(3, 9, 10, 1.0).await.unwrap();
        service.update_reserve(&offer.id, 5).await.unwrap();

        let shipment = shipment(vec![Unit::new(&offer.id, 2), Unit::new("missing", 1)]);
        let err = service.remove_reserved(&shipment).await.unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(service.get_offer(&offer.id).await.unwrap().reserved, 5);
        assert!(bus.messages(COMMIT_DELIVERY).is_empty());
        let cancels = bus.messages(CANCEL_DELIVERY);
        assert_eq!(cancels.len(), 1);
        assert_eq!(
            cancels[0].json::<DeliveryCancel>().unwrap(),
            DeliveryCancel::new("ship-1")
        );
    }

    #[tokio::test]
    async fn test_remove_reserved_twice_double_decrements() {
        let (service, _) = service();
        let offer = service.create_offer(3, 9, 10, 1.0).await.unwrap();
        service.update_reserve(&offer.id, 5).await.unwrap();

        let shipment = shipment(vec![Unit::new(&offer.id, 2)]);
        service.remove_reserved(&shipment).await.unwrap();
        service.remove_reserved(&shipment).await.unwrap();

        // Redelivery is not deduplicated.
        assert_eq!(service.get_offer(&offer.id).await.unwrap().reserved, 1);
    }

    #[tokio::test]
    async fn test_commit_publish_failure() {
        let (service, bus) = service();
        let offer = service.create_offer(3, 9, 10, 1.0).await.unwrap();
        bus.set_fail_on_publish(COMMIT_DELIVERY, true);

        let err = service
            .remove_reserved(&shipment(vec![Unit::new(&offer.id, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
