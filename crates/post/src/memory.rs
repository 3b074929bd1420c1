use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{AppError, Result};

use crate::IncomeDelivery;
use crate::store::PostStore;

#[derive(Debug, Default)]
struct InMemoryPostState {
    deliveries: BTreeMap<String, IncomeDelivery>,
    fail_on_save: bool,
}

/// In-memory post store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPostStore {
    state: Arc<RwLock<InMemoryPostState>>,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPostState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPostState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Makes `save_delivery` fail (or succeed again).
    pub fn set_fail_on_save(&self, fail: bool) {
        self.write().fail_on_save = fail;
    }

    pub fn delivery_count(&self) -> usize {
        self.read().deliveries.len()
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn save_delivery(&self, delivery: &IncomeDelivery) -> Result<()> {
        let mut state = self.write();
        if state.fail_on_save {
            tracing::error!(shipment_id = %delivery.shipment_id, "simulated storage failure");
            return Err(AppError::internal("Unexpected database error"));
        }
        if state.deliveries.contains_key(&delivery.shipment_id) {
            return Err(AppError::conflict("save income delivery: already exists"));
        }
        state
            .deliveries
            .insert(delivery.shipment_id.clone(), delivery.clone());
        Ok(())
    }

    async fn remove_delivery(&self, shipment_id: &str) -> Result<()> {
        self.write().deliveries.remove(shipment_id);
        Ok(())
    }

    async fn get_delivery(&self, shipment_id: &str) -> Result<Option<IncomeDelivery>> {
        Ok(self.read().deliveries.get(shipment_id).cloned())
    }
}
