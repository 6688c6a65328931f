mod supabase;

pub use supabase::SupabaseStore;

use crate::models::{Draft, DraftStatus, MarketplaceListing, PerMarketplaceResult};
use crate::profile::Settings;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("draft {0} not found")]
    NotFound(String),
    #[error("store request failed: {0}")]
    Request(String),
    #[error("invalid store response: {0}")]
    Deserialize(String),
    #[error("draft {0} kept changing underneath the update")]
    Conflict(String),
}

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn get_draft(&self, id: &str) -> Result<Draft, StoreError>;

    async fn insert_draft(&self, draft: &Draft) -> Result<(), StoreError>;

    /// Keyed write of one marketplace's outcome. `listing = None` leaves any
    /// existing listing entry alone.
    async fn record_marketplace_result(
        &self,
        id: &str,
        marketplace: &str,
        result: &PerMarketplaceResult,
        listing: Option<&MarketplaceListing>,
    ) -> Result<(), StoreError>;

    async fn set_status(
        &self,
        id: &str,
        status: DraftStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError>;

    /// Drops both the listing and the last result for a marketplace.
    async fn remove_marketplace(&self, id: &str, marketplace: &str) -> Result<Draft, StoreError>;

    async fn delete_draft(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// A missing document is the empty overlay.
    async fn load_settings(&self) -> Result<Settings, StoreError>;

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}

/// Applies one marketplace result to a draft document.
pub(crate) fn apply_result(
    draft: &mut Draft,
    marketplace: &str,
    result: &PerMarketplaceResult,
    listing: Option<&MarketplaceListing>,
) {
    draft
        .multi_marketplace_results
        .insert(marketplace.to_string(), result.clone());
    if let Some(listing) = listing {
        draft
            .marketplace_listings
            .insert(marketplace.to_string(), listing.clone());
    }
    draft.updated_at = Utc::now();
}

pub(crate) fn apply_removal(draft: &mut Draft, marketplace: &str) {
    draft.marketplace_listings.remove(marketplace);
    draft.multi_marketplace_results.remove(marketplace);
    draft.updated_at = Utc::now();
}

/// Process-local store for tests and offline runs.
#[derive(Default)]
pub struct MemoryStore {
    drafts: RwLock<HashMap<String, Draft>>,
    settings: RwLock<Settings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            drafts: RwLock::new(HashMap::new()),
            settings: RwLock::new(settings),
        }
    }

    fn update<T>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Draft) -> T,
    ) -> Result<T, StoreError> {
        let mut drafts = self.drafts.write();
        let draft = drafts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(apply(draft))
    }
}

#[async_trait]
impl DraftStore for MemoryStore {
    async fn get_draft(&self, id: &str) -> Result<Draft, StoreError> {
        self.drafts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert_draft(&self, draft: &Draft) -> Result<(), StoreError> {
        self.drafts.write().insert(draft.id.clone(), draft.clone());
        Ok(())
    }

    async fn record_marketplace_result(
        &self,
        id: &str,
        marketplace: &str,
        result: &PerMarketplaceResult,
        listing: Option<&MarketplaceListing>,
    ) -> Result<(), StoreError> {
        self.update(id, |draft| apply_result(draft, marketplace, result, listing))
    }

    async fn set_status(
        &self,
        id: &str,
        status: DraftStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        self.update(id, |draft| {
            draft.status = status;
            draft.error_message = error_message;
            draft.updated_at = Utc::now();
        })
    }

    async fn remove_marketplace(&self, id: &str, marketplace: &str) -> Result<Draft, StoreError> {
        self.update(id, |draft| {
            apply_removal(draft, marketplace);
            draft.clone()
        })
    }

    async fn delete_draft(&self, id: &str) -> Result<(), StoreError> {
        self.drafts
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_settings(&self) -> Result<Settings, StoreError> {
        Ok(self.settings.read().clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        *self.settings.write() = settings.clone();
        Ok(())
    }
}
