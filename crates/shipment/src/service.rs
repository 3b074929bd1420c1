use bus::{Producer, ProducerExt};
use chrono::Utc;
use common::topics::{NEW_POST_DELIVERY, NEW_SHIPMENT_DELIVERY};
use common::{AppError, OrderId, Result, Shipment, ShipmentStatus, Unit};
use uuid::Uuid;

use crate::state::{DeliveryEvent, Emission, transition};
use crate::store::ShipmentStore;

/// Shipment operations and the shipment side of the delivery saga.
pub struct ShipmentService<S, P> {
    store: S,
    producer: P,
}

fn parse_order_id(order_id: &str) -> Result<OrderId> {
    OrderId::parse(order_id).ok_or_else(|| {
        AppError::bad_request(format!(
            "Invalid OrderId format: '{order_id}', Accept format: '1-1'"
        ))
    })
}

impl<S, P> ShipmentService<S, P>
where
    S: ShipmentStore,
    P: Producer,
{
    pub fn new(store: S, producer: P) -> Self {
        Self { store, producer }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a shipment in status `Created` on the customer's shard.
    #[tracing::instrument(skip(self, units))]
    pub async fn new_shipment(
        &self,
        order_id: &str,
        seller_id: i64,
        destination_id: i64,
        units: Vec<Unit>,
    ) -> Result<Shipment> {
        let order_id = parse_order_id(order_id)?;
        if let Some(unit) = units.iter().find(|u| u.count <= 0) {
            return Err(AppError::bad_request(format!(
                "unit count must be positive: offerId='{}'",
                unit.offer_id
            )));
        }

        let shipment = Shipment {
            id: Uuid::new_v4().to_string(),
            order_id,
            seller_id,
            units,
            destination_id,
            status: ShipmentStatus::Created,
            created_time: Utc::now(),
        };
        self.store.save_shipment(&shipment).await?;

        metrics::counter!("shipments_created_total").increment(1);
        tracing::info!(shipment_id = %shipment.id, "shipment created");
        Ok(shipment)
    }

    pub async fn get_shipment(&self, shipment_id: &str) -> Result<Shipment> {
        self.store.get_shipment(shipment_id).await
    }

    pub async fn get_order_shipments(&self, order_id: &str) -> Result<Vec<Shipment>> {
        let order_id = parse_order_id(order_id)?;
        self.store.get_shipments_by_order(&order_id).await
    }

    /// Publishes a stored shipment to `new_shipment_delivery`, starting the saga.
    #[tracing::instrument(skip(self))]
    pub async fn request_delivery(&self, shipment_id: &str) -> Result<Shipment> {
        let shipment = self.store.get_shipment(shipment_id).await?;
        self.producer
            .send_json(NEW_SHIPMENT_DELIVERY, Some(&shipment.id), &shipment)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to publish delivery request");
                AppError::internal("Unexpected bus error")
            })?;
        Ok(shipment)
    }

    /// A destination post accepted the shipment.
    ///
    /// Moves it to `AcceptDelivery` and forwards it to the post service. A
    /// failed publish is only logged.
    pub async fn accept_delivery(&self, shipment: &Shipment) -> Result<()> {
        self.apply(&shipment.id, DeliveryEvent::Accept).await
    }

    /// The reservation was released; the shipment goes out.
    pub async fn commit_delivery(&self, shipment: &Shipment) -> Result<()> {
        self.apply(&shipment.id, DeliveryEvent::Commit).await
    }

    /// Compensation: resets the shipment to `Packing`.
    pub async fn cancel_delivery(&self, shipment_id: &str) -> Result<()> {
        self.apply(shipment_id, DeliveryEvent::Cancel).await
    }

    #[tracing::instrument(skip(self), fields(event = event.as_str()))]
    async fn apply(&self, shipment_id: &str, event: DeliveryEvent) -> Result<()> {
        let mut shipment = self.store.get_shipment(shipment_id).await?;

        let step = match transition(shipment.status, event) {
            Ok(step) => step,
            Err(e) => {
                metrics::counter!("shipment_transition_rejected_total", "event" => event.as_str())
                    .increment(1);
                tracing::warn!(status = %shipment.status, error = %e, "transition rejected");
                return Err(e.into());
            }
        };

        self.store.update_status(&shipment, step.next).await?;
        metrics::counter!("shipment_transitions_total", "event" => event.as_str()).increment(1);
        tracing::info!(from = %shipment.status, to = %step.next, "shipment status updated");
        shipment.status = step.next;

        match step.emit {
            Some(Emission::RegisterDelivery) => {
                if let Err(e) = self
                    .producer
                    .send_json(NEW_POST_DELIVERY, Some(&shipment.id), &shipment)
                    .await
                {
                    tracing::error!(error = %e, "failed to publish post delivery");
                }
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bus::InMemoryBus;
    use sharding::{MemoryConnector, ShardRouter, ShardTopology};

    use super::*;
    use crate::memory::InMemoryShipmentStore;

    async fn service() -> (ShipmentService<InMemoryShipmentStore, InMemoryBus>, InMemoryBus) {
        let router = Arc::new(ShardRouter::new(MemoryConnector::new()));
        router
            .reconfigure(
                &ShardTopology::from_json(
                    br#"{"buckets":{"0":"s1","1":"s2"},"servers":{"s1":"mem://s1","s2":"mem://s2"}}"#,
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let bus = InMemoryBus::new(1);
        (
            ShipmentService::new(InMemoryShipmentStore::new(router), bus.clone()),
            bus,
        )
    }

    #[tokio::test]
    async fn test_new_shipment_lands_on_customer_shard() {
        let (service, _) = service().await;
        let shipment = service
            .new_shipment("1-1", 3, 77, vec![Unit::new("O9", 2)])
            .await
            .unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Created);

        // fnv1_32("1") is even: bucket 0, server s1.
        let router = service.store().router();
        let s1 = router.connector().shard("mem://s1").await;
        let s2 = router.connector().shard("mem://s2").await;
        assert!(s1.read().await.contains_key(&shipment.id));
        assert!(!s2.read().await.contains_key(&shipment.id));

        assert_eq!(service.get_shipment(&shipment.id).await.unwrap(), shipment);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let (service, _) = service().await;
        for bad in ["", "1", "a-1", "1-", "-1"] {
            let err = service.new_shipment(bad, 1, 1, vec![]).await.unwrap_err();
            assert_eq!(err.status_code(), 400, "{bad}");
        }
        let err = service
            .new_shipment("1-1", 1, 1, vec![Unit::new("O1", 0)])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(service.get_order_shipments("x").await.unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn test_get_order_shipments() {
        let (service, _) = service().await;
        let a = service.new_shipment("2-7", 1, 1, vec![]).await.unwrap();
        let b = service.new_shipment("2-7", 1, 2, vec![]).await.unwrap();
        service.new_shipment("2-8", 1, 1, vec![]).await.unwrap();

        let ids: Vec<String> = service
            .get_order_shipments("2-7")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id) && ids.contains(&b.id));
    }

    #[tokio::test]
    async fn test_unknown_shipment_is_not_found() {
        let (service, _) = service().await;
        assert!(service.get_shipment("nope").await.unwrap_err().is_not_found());
        assert!(service.cancel_delivery("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_accept_emits_post_delivery() {
        let (service, bus) = service().await;
        let shipment = service.new_shipment("5-1", 3, 77, vec![Unit::new("O9", 2)]).await.unwrap();

        service.accept_delivery(&shipment).await.unwrap();

        let stored = service.get_shipment(&shipment.id).await.unwrap();
        assert_eq!(stored.status, ShipmentStatus::AcceptDelivery);
        let sent = bus.messages(NEW_POST_DELIVERY);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].json::<Shipment>().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_accept_twice_is_rejected() {
        let (service, bus) = service().await;
        let shipment = service.new_shipment("5-1", 3, 77, vec![]).await.unwrap();
        service.accept_delivery(&shipment).await.unwrap();

        let err = service.accept_delivery(&shipment).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(bus.messages(NEW_POST_DELIVERY).len(), 1);
    }

    #[tokio::test]
    async fn test_accept_survives_publish_failure() {
        let (service, bus) = service().await;
        bus.set_fail_on_publish(NEW_POST_DELIVERY, true);
        let shipment = service.new_shipment("5-1", 3, 77, vec![]).await.unwrap();

        service.accept_delivery(&shipment).await.unwrap();
        assert_eq!(
            service.get_shipment(&shipment.id).await.unwrap().status,
            ShipmentStatus::AcceptDelivery
        );
    }

    #[tokio::test]
    async fn test_commit_and_cancel() {
        let (service, _) = service().await;
        let shipment = service.new_shipment("5-1", 3, 77, vec![]).await.unwrap();
        service.accept_delivery(&shipment).await.unwrap();

        service.cancel_delivery(&shipment.id).await.unwrap();
        assert_eq!(
            service.get_shipment(&shipment.id).await.unwrap().status,
            ShipmentStatus::Packing
        );

        // Packing may be accepted again.
        service.accept_delivery(&shipment).await.unwrap();
        service.commit_delivery(&shipment).await.unwrap();
        assert_eq!(
            service.get_shipment(&shipment.id).await.unwrap().status,
            ShipmentStatus::InDelivery
        );
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_status() {
        let (service, bus) = service().await;
        let shipment = service.new_shipment("5-1", 3, 77, vec![]).await.unwrap();
        service.store().set_fail_on_update(true);

        assert_eq!(service.accept_delivery(&shipment).await.unwrap_err().status_code(), 500);
        assert_eq!(
            service.get_shipment(&shipment.id).await.unwrap().status,
            ShipmentStatus::Created
        );
        assert!(bus.messages(NEW_POST_DELIVERY).is_empty());
    }

    #[tokio::test]
    async fn test_request_delivery_publishes() {
        let (service, bus) = service().await;
        let shipment = service.new_shipment("5-1", 3, 77, vec![]).await.unwrap();

        service.request_delivery(&shipment.id).await.unwrap();
        let sent = bus.messages(NEW_SHIPMENT_DELIVERY);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key.as_deref(), Some(shipment.id.as_str()));
    }
}
