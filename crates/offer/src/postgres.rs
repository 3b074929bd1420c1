use std::collections::BTreeMap;

use async_trait::async_trait;
use common::{AppError, Result};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::model::Offer;
use crate::store::{OfferStore, not_found};

/// Schema for the offer database.
pub const MIGRATION: &str = include_str!("../../../migrations/001_create_offer_table.sql");

/// PostgreSQL-backed offer store.
#[derive(Clone)]
pub struct PgOfferStore {
    pool: PgPool,
}

impl PgOfferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the offer table and id sequence if missing.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::raw_sql(MIGRATION).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_offer(row: PgRow) -> std::result::Result<Offer, sqlx::Error> {
        Ok(Offer {
            id: row.try_get("id")?,
            seller_id: row.try_get("seller_id")?,
            product_id: row.try_get("product_id")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            reserved: row.try_get("reserved")?,
        })
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::database("open transaction", "", e))
    }

    async fn fetch_for_update(
        tx: &mut Transaction<'static, Postgres>,
        offer_id: &str,
    ) -> Result<Offer> {
        sqlx::query(
            r#"
            SELECT id, seller_id, product_id, price, stock, reserved
            FROM offer
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(offer_id)
        .fetch_one(&mut **tx)
        .await
        .and_then(Self::row_to_offer)
        .map_err(|e| AppError::database("get offer", not_found(offer_id), e))
    }
}

#[async_trait]
impl OfferStore for PgOfferStore {
    async fn get_offer(&self, offer_id: &str) -> Result<Offer> {
        sqlx::query(
            r#"
            SELECT id, seller_id, product_id, price, stock, reserved
            FROM offer
            WHERE id = $1
            "#,
        )
        .bind(offer_id)
        .fetch_one(&self.pool)
        .await
        .and_then(Self::row_to_offer)
        .map_err(|e| AppError::database("get offer", not_found(offer_id), e))
    }

    async fn save_offer(&self, offer: &Offer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO offer (id, seller_id, product_id, stock, reserved, price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&offer.id)
        .bind(offer.seller_id)
        .bind(offer.product_id)
        .bind(offer.stock)
        .bind(offer.reserved)
        .bind(offer.price)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database("save offer", not_found(&offer.id), e))?;
        Ok(())
    }

    async fn update_offer<F>(&self, offer_id: &str, update: F) -> Result<Offer>
    where
        F: FnOnce(Offer) -> Offer + Send + 'static,
    {
        let mut tx = self.begin().await?;
        let current = Self::fetch_for_update(&mut tx, offer_id).await?;
        let updated = update(current);

        let result = sqlx::query("UPDATE offer SET stock = $2, reserved = $3, price = $4 WHERE id = $1")
            .bind(offer_id)
            .bind(updated.stock)
            .bind(updated.reserved)
            .bind(updated.price)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("update offer", not_found(offer_id), e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(not_found(offer_id)));
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database("commit offer update", not_found(offer_id), e))?;
        Ok(updated)
    }

    async fn remove_reserved(&self, counts: &BTreeMap<String, i64>) -> Result<()> {
        // Dropping the transaction on an early return rolls every decrement back.
        let mut tx = self.begin().await?;
        for (offer_id, count) in counts {
            let result = sqlx::query("UPDATE offer SET reserved = reserved - $1 WHERE id = $2")
                .bind(count)
                .bind(offer_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::database("remove reserved", not_found(offer_id), e))?;
            if result.rows_affected() == 0 {
                return Err(AppError::not_found(not_found(offer_id)));
            }
        }
        tx.commit()
            .await
            .map_err(|e| AppError::database("commit remove reserved", "", e))?;
        Ok(())
    }

    async fn next_id(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT nextval('offer_id')")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database("next offer id", "", e))
    }
}
