//! Types shared by the offer, shipment and post services.
//!
//! Everything that crosses a service boundary lives here: the shipment record
//! carried on the bus, the compensation payload, topic names and the error
//! taxonomy every service reports with.

pub mod error;
pub mod status;
pub mod topics;
pub mod types;

pub use error::{AppError, ErrorKind, Result};
pub use status::ShipmentStatus;
pub use types::{DeliveryCancel, OrderId, Shipment, Unit};
