//! Post service: records shipments a destination post office is waiting for
//! and asks the offer service to release their reservation.

pub mod consumer;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use consumer::PostConsumer;
pub use memory::InMemoryPostStore;
pub use postgres::PgPostStore;
pub use service::PostService;
pub use store::PostStore;

/// A shipment accepted by destination post `post_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeDelivery {
    pub post_id: i64,
    pub shipment_id: String,
    pub created_time: DateTime<Utc>,
}
