//! End-to-end delivery saga over the in-memory bus and stores.

use std::sync::Arc;
use std::time::Duration;

use bus::InMemoryBus;
use cache::InMemoryCache;
use common::topics::{CANCEL_DELIVERY, COMMIT_DELIVERY, NEW_SHIPMENT_DELIVERY, REMOVE_RESERVE};
use common::{Shipment, ShipmentStatus, Unit};
use offer::{CachedOfferStore, InMemoryOfferStore, Offer, OfferService, OfferStore};
use post::{InMemoryPostStore, PostService, PostStore};
use saga::{Choreography, OFFER_GROUP, POST_GROUP, SHIPMENT_GROUP};
use sharding::{MemoryConnector, ShardRouter, ShardTopology};
use shipment::{InMemoryShipmentStore, ShipmentService, ShipmentTable};

type Offers = CachedOfferStore<InMemoryOfferStore, InMemoryCache<Offer>>;

struct Harness {
    bus: InMemoryBus,
    offers: InMemoryOfferStore,
    router: Arc<ShardRouter<MemoryConnector<ShipmentTable>>>,
    shipment: Arc<ShipmentService<InMemoryShipmentStore, InMemoryBus>>,
    post: Arc<PostService<InMemoryPostStore, InMemoryBus>>,
    choreography: Choreography,
}

impl Harness {
    async fn start() -> Self {
        let bus = InMemoryBus::new(3);

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

        let offers = InMemoryOfferStore::new();
        let offer = Arc::new(OfferService::new(
            Offers::new(offers.clone(), InMemoryCache::new()),
            bus.clone(),
        ));
        let shipment = Arc::new(ShipmentService::new(
            InMemoryShipmentStore::new(router.clone()),
            bus.clone(),
        ));
        let post = Arc::new(PostService::new(InMemoryPostStore::new(), bus.clone()));

        let choreography = Choreography::start(&bus, offer, shipment.clone(), post.clone())
            .await
            .unwrap();

        Self {
            bus,
            offers,
            router,
            shipment,
            post,
            choreography,
        }
    }

    async fn seed_offer(&self, id: &str, stock: i64, reserved: i64) {
        self.offers
            .save_offer(&Offer {
                id: id.to_string(),
                seller_id: 3,
                product_id: 9,
                price: 10.0,
                stock,
                reserved,
            })
            .await
            .unwrap();
    }

    fn reserved(&self, id: &str) -> i64 {
        self.offers.peek(id).unwrap().reserved
    }

    async fn deliver(&self, shipment: &Shipment) {
        self.shipment.request_delivery(&shipment.id).await.unwrap();
        assert!(self.bus.wait_idle(Duration::from_secs(5)).await);
    }

    async fn status(&self, shipment: &Shipment) -> ShipmentStatus {
        self.shipment.get_shipment(&shipment.id).await.unwrap().status
    }
}

#[tokio::test]
async fn delivery_completes_and_releases_reservation() {
    let h = Harness::start().await;
    h.seed_offer("O9", 10, 5).await;
    let shipment = h
        .shipment
        .new_shipment("5-1", 3, 77, vec![Unit::new("O9", 2)])
        .await
        .unwrap();

    h.deliver(&shipment).await;

    assert_eq!(h.status(&shipment).await, ShipmentStatus::InDelivery);
    assert_eq!(h.reserved("O9"), 3);
    let delivery = h.post.store().get_delivery(&shipment.id).await.unwrap().unwrap();
    assert_eq!(delivery.post_id, 77);
    assert_eq!(h.bus.published_count(CANCEL_DELIVERY), 0);
    assert_eq!(h.bus.published_count(COMMIT_DELIVERY), 1);
    // Every group consumed every topic, so nothing is retained.
    for topic in common::topics::ALL {
        assert_eq!(h.bus.retained(topic), 0, "{topic}");
    }

    h.choreography.stop().await;
}

#[tokio::test]
async fn post_failure_compensates() {
    let h = Harness::start().await;
    h.seed_offer("O9", 10, 5).await;
    h.post.store().set_fail_on_save(true);
    let shipment = h
        .shipment
        .new_shipment("5-1", 3, 77, vec![Unit::new("O9", 2)])
        .await
        .unwrap();

    h.deliver(&shipment).await;

    assert_eq!(h.status(&shipment).await, ShipmentStatus::Packing);
    assert_eq!(h.reserved("O9"), 5);
    assert_eq!(h.bus.published_count(REMOVE_RESERVE), 0);
    assert_eq!(h.bus.published_count(CANCEL_DELIVERY), 1);
    // The failed message was still committed.
    assert_eq!(h.bus.lag(POST_GROUP), 0);

    // Once the post recovers the shipment can be delivered again.
    h.post.store().set_fail_on_save(false);
    h.deliver(&shipment).await;
    assert_eq!(h.status(&shipment).await, ShipmentStatus::InDelivery);
    assert_eq!(h.reserved("O9"), 3);

    h.choreography.stop().await;
}

#[tokio::test]
async fn offer_failure_compensates_shipment_and_post() {
    let h = Harness::start().await;
    h.seed_offer("O1", 10, 4).await;
    // "O1" releases first; the missing "O2" must roll it back.
    let shipment = h
        .shipment
        .new_shipment("5-1", 3, 77, vec![Unit::new("O1", 1), Unit::new("O2", 1)])
        .await
        .unwrap();

    h.deliver(&shipment).await;

    assert_eq!(h.status(&shipment).await, ShipmentStatus::Packing);
    assert_eq!(h.reserved("O1"), 4);
    assert!(h.post.store().get_delivery(&shipment.id).await.unwrap().is_none());
    assert_eq!(h.bus.published_count(COMMIT_DELIVERY), 0);
    for group in [OFFER_GROUP, SHIPMENT_GROUP, POST_GROUP] {
        assert_eq!(h.bus.lag(group), 0, "{group}");
    }

    h.choreography.stop().await;
}

#[tokio::test]
async fn duplicate_request_releases_once() {
    let h = Harness::start().await;
    h.seed_offer("O9", 10, 5).await;
    let shipment = h
        .shipment
        .new_shipment("5-1", 3, 77, vec![Unit::new("O9", 2)])
        .await
        .unwrap();

    h.shipment.request_delivery(&shipment.id).await.unwrap();
    h.deliver(&shipment).await;

    assert_eq!(h.bus.published_count(NEW_SHIPMENT_DELIVERY), 2);
    assert_eq!(h.status(&shipment).await, ShipmentStatus::InDelivery);
    assert_eq!(h.reserved("O9"), 3);

    h.choreography.stop().await;
}

#[tokio::test]
async fn shipment_is_stored_on_customer_shard() {
    let h = Harness::start().await;
    h.seed_offer("O9", 10, 5).await;
    let shipment = h
        .shipment
        .new_shipment("1-1", 3, 77, vec![Unit::new("O9", 1)])
        .await
        .unwrap();

    h.deliver(&shipment).await;

    // fnv1_32("1") is even: bucket 0, server s1.
    let s1 = h.router.connector().shard("mem://s1").await;
    let s2 = h.router.connector().shard("mem://s2").await;
    assert_eq!(
        s1.read().await.get(&shipment.id).map(|s| s.status),
        Some(ShipmentStatus::InDelivery)
    );
    assert!(s2.read().await.is_empty());

    h.choreography.stop().await;
}

#[tokio::test]
async fn groups_are_exclusive() {
    let h = Harness::start().await;
    assert_eq!(h.choreography.groups(), vec![OFFER_GROUP, SHIPMENT_GROUP, POST_GROUP]);

    let offer = Arc::new(OfferService::new(InMemoryOfferStore::new(), h.bus.clone()));
    let post = Arc::new(PostService::new(InMemoryPostStore::new(), h.bus.clone()));
    let second = Choreography::start(&h.bus, offer, h.shipment.clone(), post).await;
    assert!(second.is_err());

    // The failed start released nothing it did not own.
    assert_eq!(h.choreography.groups().len(), 3);
    h.choreography.stop().await;
}
