use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{AppError, OrderId, Result, Shipment, ShipmentStatus};
use sharding::{MemoryConnector, ShardError, ShardRouter};
use tokio::sync::RwLock;

use crate::error::{shard_error, shipment_not_found};
use crate::store::ShipmentStore;

/// One in-memory shard: shipments by id.
pub type ShipmentTable = RwLock<BTreeMap<String, Shipment>>;

/// Shipment store over in-memory shards, routed exactly like the Postgres one.
#[derive(Clone)]
pub struct InMemoryShipmentStore {
    router: Arc<ShardRouter<MemoryConnector<ShipmentTable>>>,
    fail_on_update: Arc<AtomicBool>,
}

impl InMemoryShipmentStore {
    pub fn new(router: Arc<ShardRouter<MemoryConnector<ShipmentTable>>>) -> Self {
        Self {
            router,
            fail_on_update: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn router(&self) -> &Arc<ShardRouter<MemoryConnector<ShipmentTable>>> {
        &self.router
    }

    /// Makes `update_status` fail (or succeed again).
    pub fn set_fail_on_update(&self, fail: bool) {
        self.fail_on_update.store(fail, Ordering::SeqCst);
    }

    async fn shard_for(&self, order_id: &OrderId) -> Result<Arc<ShipmentTable>> {
        self.router
            .resolve(order_id.customer_id())
            .await
            .map_err(|e| shard_error("resolve shard", "", e))
    }
}

#[async_trait]
impl ShipmentStore for InMemoryShipmentStore {
    async fn save_shipment(&self, shipment: &Shipment) -> Result<()> {
        let shard = self.shard_for(&shipment.order_id).await?;
        let mut table = shard.write().await;
        if table.contains_key(&shipment.id) {
            return Err(AppError::conflict(format!(
                "Shipment already exists: shipmentId='{}'",
                shipment.id
            )));
        }
        table.insert(shipment.id.clone(), shipment.clone());
        Ok(())
    }

    async fn get_shipment(&self, shipment_id: &str) -> Result<Shipment> {
        let id = shipment_id.to_string();
        self.router
            .query_unkeyed(move |_server, table: Arc<ShipmentTable>| {
                let id = id.clone();
                async move { Ok::<_, ShardError>(table.read().await.get(&id).cloned()) }
            })
            .await
            .map_err(|e| shard_error("get shipment", shipment_not_found(shipment_id), e))
    }

    async fn get_shipments_by_order(&self, order_id: &OrderId) -> Result<Vec<Shipment>> {
        let shard = self.shard_for(order_id).await?;
        let table = shard.read().await;
        let mut shipments: Vec<Shipment> = table
            .values()
            .filter(|s| &s.order_id == order_id)
            .cloned()
            .collect();
        shipments.sort_by_key(|s| s.created_time);
        Ok(shipments)
    }

    async fn update_status(&self, shipment: &Shipment, status: ShipmentStatus) -> Result<()> {
        if self.fail_on_update.load(Ordering::SeqCst) {
            tracing::error!(shipment_id = %shipment.id, "simulated storage failure");
            return Err(AppError::internal("Unexpected database error"));
        }
        let shard = self.shard_for(&shipment.order_id).await?;
        let mut table = shard.write().await;
        let stored = table
            .get_mut(&shipment.id)
            .ok_or_else(|| AppError::not_found(shipment_not_found(&shipment.id)))?;
        stored.status = status;
        Ok(())
    }
}
