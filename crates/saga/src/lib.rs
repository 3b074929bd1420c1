//! Order fulfillment as a choreography.
//!
//! There is no coordinator. Each service consumes the topics it cares about
//! under its own consumer group and publishes the next event:
//!
//! ```text
//! new_shipment_delivery -> shipment: Created|Packing -> AcceptDelivery
//! new_post_delivery     -> post:     register income delivery
//! remove_reserve        -> offer:    release reserved units
//! commit_delivery       -> shipment: AcceptDelivery -> InDelivery
//! cancel_delivery       -> shipment: back to Packing; post: forget delivery
//! ```

use std::sync::Arc;

use bus::{BusError, ConsumerHandle, InMemoryBus, Producer};
use offer::{OfferConsumer, OfferService, OfferStore};
use post::{PostConsumer, PostService, PostStore};
use shipment::{ShipmentConsumer, ShipmentService, ShipmentStore};

pub const OFFER_GROUP: &str = "offer";
pub const SHIPMENT_GROUP: &str = "shipment";
pub const POST_GROUP: &str = "post";

/// The three service consumers attached to one bus.
pub struct Choreography {
    handles: Vec<ConsumerHandle>,
}

impl Choreography {
    /// Subscribes every service under its own consumer group.
    ///
    /// If a subscription fails the ones already made are stopped again.
    pub async fn start<OS, SS, PS, P>(
        bus: &InMemoryBus,
        offer: Arc<OfferService<OS, P>>,
        shipment: Arc<ShipmentService<SS, P>>,
        post: Arc<PostService<PS, P>>,
    ) -> Result<Self, BusError>
    where
        OS: OfferStore + 'static,
        SS: ShipmentStore + 'static,
        PS: PostStore + 'static,
        P: Producer + 'static,
    {
        let mut handles = Vec::with_capacity(3);
        let subscriptions = [
            bus.subscribe(
                OFFER_GROUP,
                OfferConsumer::<OS, P>::topics(),
                OfferConsumer::new(offer),
            ),
            bus.subscribe(
                SHIPMENT_GROUP,
                ShipmentConsumer::<SS, P>::topics(),
                ShipmentConsumer::new(shipment),
            ),
            bus.subscribe(
                POST_GROUP,
                PostConsumer::<PS, P>::topics(),
                PostConsumer::new(post),
            ),
        ];

        let mut failure = None;
        for subscription in subscriptions {
            match subscription {
                Ok(handle) => handles.push(handle),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(_) => {}
            }
        }
        if let Some(e) = failure {
            tracing::error!(error = %e, "failed to start choreography");
            for handle in handles {
                handle.stop().await;
            }
            return Err(e);
        }

        tracing::info!("choreography started");
        Ok(Self { handles })
    }

    pub fn groups(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.group()).collect()
    }

    /// Stops every consumer after its message in progress.
    pub async fn stop(self) {
        for handle in self.handles {
            handle.stop().await;
        }
        tracing::info!("choreography stopped");
    }
}
