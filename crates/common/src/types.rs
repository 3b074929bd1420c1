use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::ShipmentStatus;

/// Order identifier of the form `"<customerId>-<sequence>"`.
///
/// The customer part is the shard key for every record derived from the order.
/// Values arriving over the bus are taken as-is; [`OrderId::parse`] is the
/// validating constructor for request input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Parses a `"<digits>-<digits>"` order id.
    pub fn parse(id: &str) -> Option<Self> {
        let (customer, sequence) = id.split_once('-')?;
        let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        (is_number(customer) && is_number(sequence)).then(|| Self(id.to_string()))
    }

    /// Wraps a raw id without validation.
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The customer portion, used as shard key.
    pub fn customer_id(&self) -> &str {
        match self.0.split_once('-') {
            Some((customer, _)) => customer,
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A number of items of one offer inside a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub offer_id: String,
    pub count: i64,
}

impl Unit {
    pub fn new(offer_id: impl Into<String>, count: i64) -> Self {
        Self {
            offer_id: offer_id.into(),
            count,
        }
    }
}

/// A shipment of one seller's units towards a destination post office.
///
/// This is the full record carried on every forward saga topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: String,
    pub order_id: OrderId,
    pub seller_id: i64,
    pub units: Vec<Unit>,
    pub destination_id: i64,
    pub status: ShipmentStatus,
    pub created_time: DateTime<Utc>,
}

impl Shipment {
    /// Units folded into `offerId -> count`. Repeated offers are summed.
    pub fn unit_counts(&self) -> BTreeMap<String, i64> {
        let mut counts = BTreeMap::new();
        for unit in &self.units {
            *counts.entry(unit.offer_id.clone()).or_insert(0) += unit.count;
        }
        counts
    }
}

/// Compensation payload of the `cancel_delivery` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCancel {
    pub shipment_id: String,
}

impl DeliveryCancel {
    pub fn new(shipment_id: impl Into<String>) -> Self {
        Self {
            shipment_id: shipment_id.into(),
        }
    }
}
