use async_trait::async_trait;
use common::Result;

use crate::IncomeDelivery;

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn save_delivery(&self, delivery: &IncomeDelivery) -> Result<()>;

    /// Removes the delivery of `shipment_id`. Absent rows are not an error.
    async fn remove_delivery(&self, shipment_id: &str) -> Result<()>;

    async fn get_delivery(&self, shipment_id: &str) -> Result<Option<IncomeDelivery>>;
}
