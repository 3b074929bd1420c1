use std::collections::BTreeMap;

use async_trait::async_trait;
use common::Result;

use crate::model::Offer;

/// Persistence for offers.
#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn get_offer(&self, offer_id: &str) -> Result<Offer>;

    async fn save_offer(&self, offer: &Offer) -> Result<()>;

    /// Read-modify-write of one offer inside a local transaction.
    ///
    /// `NotFound` if the offer is missing or vanishes before the write.
    async fn update_offer<F>(&self, offer_id: &str, update: F) -> Result<Offer>
    where
        F: FnOnce(Offer) -> Offer + Send + 'static;

    /// Decrements `reserved` of every listed offer, all or nothing.
    async fn remove_reserved(&self, counts: &BTreeMap<String, i64>) -> Result<()>;

    /// Next value of the offer id sequence.
    async fn next_id(&self) -> Result<i64>;
}

pub(crate) fn not_found(offer_id: &str) -> String {
    format!("Not found offer: offerId='{offer_id}'")
}
