use async_trait::async_trait;
use common::{AppError, Result};
use sqlx::{PgPool, Row};

use crate::IncomeDelivery;
use crate::store::PostStore;

/// Schema for the post database.
pub const MIGRATION: &str =
    include_str!("../../../migrations/003_create_income_delivery_table.sql");

#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::raw_sql(MIGRATION).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn save_delivery(&self, delivery: &IncomeDelivery) -> Result<()> {
        sqlx::query(
            "INSERT INTO income_delivery (post_id, shipment_id, created_time) VALUES ($1, $2, $3)",
        )
        .bind(delivery.post_id)
        .bind(&delivery.shipment_id)
        .bind(delivery.created_time)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database("save income delivery", "", e))?;
        Ok(())
    }

    async fn remove_delivery(&self, shipment_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM income_delivery WHERE shipment_id = $1")
            .bind(shipment_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("delete income delivery", "", e))?;
        Ok(())
    }

    async fn get_delivery(&self, shipment_id: &str) -> Result<Option<IncomeDelivery>> {
        let row = sqlx::query(
            "SELECT post_id, shipment_id, created_time FROM income_delivery WHERE shipment_id = $1",
        )
        .bind(shipment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("get income delivery", "", e))?;

        row.map(|row| -> std::result::Result<IncomeDelivery, sqlx::Error> {
            Ok(IncomeDelivery {
                post_id: row.try_get("post_id")?,
                shipment_id: row.try_get("shipment_id")?,
                created_time: row.try_get("created_time")?,
            })
        })
        .transpose()
        .map_err(|e| AppError::database("decode income delivery", "", e))
    }
}
