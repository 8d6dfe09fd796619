//! Gift catalog cache
//!
//! Read-mostly view over the gift store. Settlement needs price and
//! validity on every send; those are immutable-ish catalog fields, so a
//! process-local cache is safe. Counter fields may lag - the store is
//! authoritative for those.

use dashmap::DashMap;
use std::sync::Arc;

use super::types::{Gift, GiftId};
use crate::error::BillingError;
use crate::store::GiftStore;

pub struct GiftCatalog {
    store: Arc<dyn GiftStore>,
    cache: DashMap<GiftId, Gift>,
}

impl GiftCatalog {
    pub fn new(store: Arc<dyn GiftStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Reload the cache from the store; returns the number of active gifts
    pub async fn refresh(&self) -> Result<usize, BillingError> {
        let gifts = self.store.list_active_gifts().await?;
        self.cache.clear();
        for gift in &gifts {
            self.cache.insert(gift.gift_id, gift.clone());
        }
        Ok(gifts.len())
    }

    /// Look up a gift, falling through to the store on a cache miss
    pub async fn get(&self, id: GiftId) -> Result<Option<Gift>, BillingError> {
        if let Some(gift) = self.cache.get(&id) {
            return Ok(Some(gift.clone()));
        }
        let gift = self.store.gift(id).await?;
        if let Some(ref gift) = gift {
            self.cache.insert(gift.gift_id, gift.clone());
        }
        Ok(gift)
    }

    /// Drop a gift from the cache (after an admin edit)
    pub fn invalidate(&self, id: GiftId) {
        self.cache.remove(&id);
    }

    /// All cached active gifts, cheapest first
    pub async fn list_active(&self) -> Result<Vec<Gift>, BillingError> {
        self.store.list_active_gifts().await
    }
}
