//! Message-bus topics of the delivery saga.

/// A shipment was handed over for delivery. Payload: [`crate::Shipment`].
pub const NEW_SHIPMENT_DELIVERY: &str = "new_shipment_delivery";

/// Post office must register the incoming delivery. Payload: [`crate::Shipment`].
pub const NEW_POST_DELIVERY: &str = "new_post_delivery";

/// Offer service must release the reserved units. Payload: [`crate::Shipment`].
pub const REMOVE_RESERVE: &str = "remove_reserve";

/// Reservation released, shipment may go out. Payload: [`crate::Shipment`].
pub const COMMIT_DELIVERY: &str = "commit_delivery";

/// Compensation. Payload: [`crate::DeliveryCancel`].
pub const CANCEL_DELIVERY: &str = "cancel_delivery";

/// All saga topics.
pub const ALL: [&str; 5] = [
    NEW_SHIPMENT_DELIVERY,
    NEW_POST_DELIVERY,
    REMOVE_RESERVE,
    COMMIT_DELIVERY,
    CANCEL_DELIVERY,
];
