use async_trait::async_trait;
use common::{OrderId, Result, Shipment, ShipmentStatus};

/// Sharded persistence for shipments.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Inserts `shipment` on its customer's shard.
    async fn save_shipment(&self, shipment: &Shipment) -> Result<()>;

    /// Looks a shipment up by id across every shard.
    async fn get_shipment(&self, shipment_id: &str) -> Result<Shipment>;

    /// Shipments of one order, from the customer's shard.
    async fn get_shipments_by_order(&self, order_id: &OrderId) -> Result<Vec<Shipment>>;

    /// Overwrites the status of `shipment` on its customer's shard.
    async fn update_status(&self, shipment: &Shipment, status: ShipmentStatus) -> Result<()>;
}
