use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, OrderId, Result, Shipment, ShipmentStatus, Unit};
use sharding::{PgConnector, ShardError, ShardRouter};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{shard_error, shipment_not_found};
use crate::store::ShipmentStore;

/// Schema applied to every shipment shard.
pub const MIGRATION: &str = include_str!("../../../migrations/002_create_shipment_table.sql");

const SELECT_SHIPMENT: &str = r#"
    SELECT id, order_id, seller_id, units, destination_id, status, created_time
    FROM shipment
"#;

/// Shipment store over sharded PostgreSQL.
#[derive(Clone)]
pub struct PgShipmentStore {
    router: Arc<ShardRouter<PgConnector>>,
}

impl PgShipmentStore {
    pub fn new(router: Arc<ShardRouter<PgConnector>>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<ShardRouter<PgConnector>> {
        &self.router
    }

    /// Creates the shipment table on every active shard.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::Error> {
        let snapshot = self.router.snapshot().await;
        for (server, pool) in snapshot.connections() {
            tracing::info!(%server, "migrating shipment shard");
            sqlx::raw_sql(MIGRATION).execute(pool).await?;
        }
        Ok(())
    }

    async fn shard_for(&self, order_id: &OrderId) -> Result<PgPool> {
        self.router
            .resolve(order_id.customer_id())
            .await
            .map_err(|e| shard_error("resolve shard", "", e))
    }
}

fn row_to_shipment(row: PgRow) -> std::result::Result<Shipment, sqlx::Error> {
    let ordinal: i32 = row.try_get("status")?;
    let status = ShipmentStatus::from_ordinal(ordinal).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown shipment status ordinal {ordinal}").into())
    })?;
    let units: Json<Vec<Unit>> = row.try_get("units")?;
    let order_id: String = row.try_get("order_id")?;

    Ok(Shipment {
        id: row.try_get("id")?,
        order_id: OrderId::new_unchecked(order_id),
        seller_id: row.try_get("seller_id")?,
        units: units.0,
        destination_id: row.try_get("destination_id")?,
        status,
        created_time: row.try_get("created_time")?,
    })
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn save_shipment(&self, shipment: &Shipment) -> Result<()> {
        let pool = self.shard_for(&shipment.order_id).await?;
        sqlx::query(
            r#"
            INSERT INTO shipment (id, order_id, seller_id, units, destination_id, status, created_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&shipment.id)
        .bind(shipment.order_id.as_str())
        .bind(shipment.seller_id)
        .bind(Json(&shipment.units))
        .bind(shipment.destination_id)
        .bind(shipment.status.ordinal())
        .bind(shipment.created_time)
        .execute(&pool)
        .await
        .map_err(|e| AppError::database("save shipment", shipment_not_found(&shipment.id), e))?;
        Ok(())
    }

    async fn get_shipment(&self, shipment_id: &str) -> Result<Shipment> {
        let id = shipment_id.to_string();
        self.router
            .query_unkeyed(move |_server, pool: PgPool| {
                let id = id.clone();
                async move {
                    let row = sqlx::query(&format!("{SELECT_SHIPMENT} WHERE id = $1"))
                        .bind(&id)
                        .fetch_optional(&pool)
                        .await?;
                    row.map(row_to_shipment)
                        .transpose()
                        .map_err(ShardError::from)
                }
            })
            .await
            .map_err(|e| shard_error("get shipment", shipment_not_found(shipment_id), e))
    }

    async fn get_shipments_by_order(&self, order_id: &OrderId) -> Result<Vec<Shipment>> {
        let pool = self.shard_for(order_id).await?;
        let rows = sqlx::query(&format!(
            "{SELECT_SHIPMENT} WHERE order_id = $1 ORDER BY created_time ASC"
        ))
        .bind(order_id.as_str())
        .fetch_all(&pool)
        .await
        .map_err(|e| AppError::database("get order shipments", "", e))?;

        rows.into_iter()
            .map(row_to_shipment)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::database("decode shipment", "", e))
    }

    async fn update_status(&self, shipment: &Shipment, status: ShipmentStatus) -> Result<()> {
        let pool = self.shard_for(&shipment.order_id).await?;
        let result = sqlx::query("UPDATE shipment SET status = $1 WHERE id = $2")
            .bind(status.ordinal())
            .bind(&shipment.id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::database("update shipment", shipment_not_found(&shipment.id), e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(shipment_not_found(&shipment.id)));
        }
        Ok(())
    }
}
