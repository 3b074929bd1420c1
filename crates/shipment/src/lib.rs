//! Shipment service.
//!
//! Shipments are stored on the shard of their order's customer. Lookups by
//! shipment id alone go through the router's scatter-gather path. Status
//! changes driven by the saga are decided by the pure [`transition`]
//! function.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod state;
pub mod store;

pub use consumer::ShipmentConsumer;
pub use memory::{InMemoryShipmentStore, ShipmentTable};
pub use postgres::PgShipmentStore;
pub use service::ShipmentService;
pub use state::{DeliveryEvent, Emission, Transition, TransitionError, transition};
pub use store::ShipmentStore;
