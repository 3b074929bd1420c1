use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{AppError, Result};

use crate::model::Offer;
use crate::store::{OfferStore, not_found};

#[derive(Debug, Default)]
struct InMemoryOfferState {
    offers: BTreeMap<String, Offer>,
    seq: i64,
    fail_on_write: HashSet<String>,
    reads: u64,
}

/// In-memory offer store for testing.
///
/// Counts reads so cache behaviour can be asserted, and can be told to fail
/// writes touching particular offers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOfferStore {
    state: Arc<RwLock<InMemoryOfferState>>,
}

impl InMemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryOfferState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryOfferState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Makes every write touching `offer_id` fail (or succeed again).
    pub fn set_fail_on_write(&self, offer_id: &str, fail: bool) {
        let mut state = self.write();
        if fail {
            state.fail_on_write.insert(offer_id.to_string());
        } else {
            state.fail_on_write.remove(offer_id);
        }
    }

    /// Number of `get_offer` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.read().reads
    }

    /// Current value without counting a read.
    pub fn peek(&self, offer_id: &str) -> Option<Offer> {
        self.read().offers.get(offer_id).cloned()
    }

    pub fn offer_count(&self) -> usize {
        self.read().offers.len()
    }
}

fn check_writable(state: &InMemoryOfferState, offer_id: &str) -> Result<()> {
    if state.fail_on_write.contains(offer_id) {
        tracing::error!(%offer_id, "simulated storage failure");
        return Err(AppError::internal("Unexpected database error"));
    }
    Ok(())
}

#[async_trait]
impl OfferStore for InMemoryOfferStore {
    async fn get_offer(&self, offer_id: &str) -> Result<Offer> {
        let mut state = self.write();
        state.reads += 1;
        state
            .offers
            .get(offer_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(not_found(offer_id)))
    }

    async fn save_offer(&self, offer: &Offer) -> Result<()> {
        let mut state = self.write();
        check_writable(&state, &offer.id)?;
        if state.offers.contains_key(&offer.id) {
            return Err(AppError::conflict(format!(
                "Offer already exists: offerId='{}'",
                offer.id
            )));
        }
        state.offers.insert(offer.id.clone(), offer.clone());
        Ok(())
    }

    async fn update_offer<F>(&self, offer_id: &str, update: F) -> Result<Offer>
    where
        F: FnOnce(Offer) -> Offer + Send + 'static,
    {
        let mut state = self.write();
        check_writable(&state, offer_id)?;
        let current = state
            .offers
            .get(offer_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(not_found(offer_id)))?;
        let updated = update(current);
        state.offers.insert(offer_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn remove_reserved(&self, counts: &BTreeMap<String, i64>) -> Result<()> {
        let mut state = self.write();
        // Work on a copy and swap it in only once every offer succeeded.
        let mut offers = state.offers.clone();
        for (offer_id, count) in counts {
            check_writable(&state, offer_id)?;
            let offer = offers
                .get_mut(offer_id)
                .ok_or_else(|| AppError::not_found(not_found(offer_id)))?;
            offer.reserved -= count;
        }
        state.offers = offers;
        Ok(())
    }

    async fn next_id(&self) -> Result<i64> {
        let mut state = self.write();
        state.seq += 1;
        Ok(state.seq)
    }
}
