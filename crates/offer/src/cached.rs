use std::collections::BTreeMap;

use async_trait::async_trait;
use cache::{Cache, CacheError};
use common::{AppError, Result};

use crate::model::Offer;
use crate::store::OfferStore;

/// Read-through, invalidate-on-write decorator around an [`OfferStore`].
///
/// Reads never serve a value the cache could not store, and any cache
/// failure other than a miss fails the call. Writes invalidate before
/// touching the primary store, so the next read after a completed write
/// goes to the primary store. Two concurrent writers can still race between
/// invalidate and the next populate.
#[derive(Clone)]
pub struct CachedOfferStore<S, C> {
    primary: S,
    cache: C,
}

impl<S, C> CachedOfferStore<S, C>
where
    S: OfferStore,
    C: Cache<Offer>,
{
    pub fn new(primary: S, cache: C) -> Self {
        Self { primary, cache }
    }

    pub fn primary(&self) -> &S {
        &self.primary
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    async fn invalidate(&self, offer_id: &str) -> Result<()> {
        self.cache
            .invalidate(offer_id)
            .await
            .map_err(|e| cache_failure("invalidate", offer_id, e))
    }
}

fn cache_failure(op: &str, offer_id: &str, err: CacheError) -> AppError {
    tracing::error!(%offer_id, error = %err, "cache {op} failed");
    AppError::internal(format!("Unexpected error from cache: {err}"))
}

#[async_trait]
impl<S, C> OfferStore for CachedOfferStore<S, C>
where
    S: OfferStore,
    C: Cache<Offer>,
{
    async fn get_offer(&self, offer_id: &str) -> Result<Offer> {
        match self.cache.get(offer_id).await {
            Ok(offer) => {
                metrics::counter!("offer_cache_hits_total").increment(1);
                Ok(offer)
            }
            Err(CacheError::Miss) => {
                metrics::counter!("offer_cache_misses_total").increment(1);
                let offer = self.primary.get_offer(offer_id).await?;
                self.cache
                    .set(offer_id, &offer)
                    .await
                    .map_err(|e| cache_failure("set", offer_id, e))?;
                Ok(offer)
            }
            Err(e) => Err(cache_failure("get", offer_id, e)),
        }
    }

    async fn save_offer(&self, offer: &Offer) -> Result<()> {
        self.invalidate(&offer.id).await?;
        self.primary.save_offer(offer).await
    }

    async fn update_offer<F>(&self, offer_id: &str, update: F) -> Result<Offer>
    where
        F: FnOnce(Offer) -> Offer + Send + 'static,
    {
        self.invalidate(offer_id).await?;
        self.primary.update_offer(offer_id, update).await
    }

    async fn remove_reserved(&self, counts: &BTreeMap<String, i64>) -> Result<()> {
        for offer_id in counts.keys() {
            self.invalidate(offer_id).await?;
        }
        self.primary.remove_reserved(counts).await
    }

    async fn next_id(&self) -> Result<i64> {
        self.primary.next_id().await
    }
}
