//! Shipment lifecycle status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a shipment.
///
/// Ordering is significant: transitions compare statuses numerically to
/// reject moves backwards or onto the same step.
///
/// ```text
/// Created(0) < Packing(1) < AcceptDelivery(2) < InDelivery(3) < Delivered(4) < Received(5)
/// Cancelled(6)
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ShipmentStatus {
    #[default]
    Created,
    Packing,
    AcceptDelivery,
    InDelivery,
    Delivered,
    Received,
    Cancelled,
}

impl ShipmentStatus {
    /// Every status, in ordinal order.
    pub const ALL: [ShipmentStatus; 7] = [
        ShipmentStatus::Created,
        ShipmentStatus::Packing,
        ShipmentStatus::AcceptDelivery,
        ShipmentStatus::InDelivery,
        ShipmentStatus::Delivered,
        ShipmentStatus::Received,
        ShipmentStatus::Cancelled,
    ];

    /// Ordinal used for storage.
    pub fn ordinal(&self) -> i32 {
        *self as i32
    }

    /// Inverse of [`ShipmentStatus::ordinal`].
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ShipmentStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "Created",
            ShipmentStatus::Packing => "Packing",
            ShipmentStatus::AcceptDelivery => "AcceptDelivery",
            ShipmentStatus::InDelivery => "InDelivery",
            ShipmentStatus::Delivered => "Delivered",
            ShipmentStatus::Received => "Received",
            ShipmentStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown shipment status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ShipmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
