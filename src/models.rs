use crate::catalog::{ItemType, MarketplaceId};
use crate::error::{ErrorKind, MarketplaceFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    #[default]
    Draft,
    Ready,
    Published,
    Error,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub sku: String,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aspects: BTreeMap<String, String>,
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub status: DraftStatus,
    /// Marketplace code to numeric category id.
    #[serde(default)]
    pub category_by_marketplace: BTreeMap<String, String>,
    /// Only marketplaces with a live listing appear here.
    #[serde(default)]
    pub marketplace_listings: BTreeMap<String, MarketplaceListing>,
    /// Last attempt per marketplace, failures included.
    #[serde(default)]
    pub multi_marketplace_results: BTreeMap<String, PerMarketplaceResult>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_condition() -> String {
    "USED_EXCELLENT".to_string()
}

impl Draft {
    pub fn new(id: impl Into<String>, sku: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            sku: sku.into(),
            item_type: None,
            title: String::new(),
            description: String::new(),
            aspects: BTreeMap::new(),
            condition: default_condition(),
            price: None,
            image_urls: Vec::new(),
            status: DraftStatus::Draft,
            category_by_marketplace: BTreeMap::new(),
            marketplace_listings: BTreeMap::new(),
            multi_marketplace_results: BTreeMap::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn item_type(&self) -> Option<ItemType> {
        self.item_type.as_deref().and_then(ItemType::from_code)
    }

    /// Operator-chosen category for a marketplace, looked up by any alias.
    pub fn category_override(&self, marketplace: MarketplaceId) -> Option<&str> {
        self.category_by_marketplace
            .iter()
            .find(|(key, _)| key.parse::<MarketplaceId>().ok() == Some(marketplace))
            .map(|(_, value)| value.as_str())
    }

    pub fn listing_for(&self, marketplace: MarketplaceId) -> Option<&MarketplaceListing> {
        self.marketplace_listings
            .iter()
            .find(|(key, _)| key.parse::<MarketplaceId>().ok() == Some(marketplace))
            .map(|(_, listing)| listing)
    }

    /// Title and at least one image: enough to be worth publishing.
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && self.image_urls.iter().any(|u| !u.trim().is_empty())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceListing {
    pub sku: String,
    pub offer_id: Option<String>,
    pub listing_id: Option<String>,
    pub listing_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerMarketplaceResult {
    pub success: bool,
    pub sku: Option<String>,
    pub offer_id: Option<String>,
    pub listing_id: Option<String>,
    pub listing_url: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Attempts spent on the deciding call (publish, or the call that failed).
    #[serde(default)]
    pub retries: u32,
    /// An already-live listing was found and reused.
    #[serde(default)]
    pub reused_existing: bool,
    pub attempted_at: DateTime<Utc>,
}

impl PerMarketplaceResult {
    pub fn success(listing: &MarketplaceListing, retries: u32, reused_existing: bool) -> Self {
        Self {
            success: true,
            sku: Some(listing.sku.clone()),
            offer_id: listing.offer_id.clone(),
            listing_id: listing.listing_id.clone(),
            listing_url: listing.listing_url.clone(),
            error: None,
            error_kind: None,
            retries,
            reused_existing,
            attempted_at: Utc::now(),
        }
    }

    pub fn failure(sku: Option<String>, offer_id: Option<String>, failure: &MarketplaceFailure) -> Self {
        Self {
            success: false,
            sku,
            offer_id,
            listing_id: None,
            listing_url: None,
            error: Some(failure.to_string()),
            error_kind: Some(failure.kind()),
            retries: failure.attempts(),
            reused_existing: false,
            attempted_at: Utc::now(),
        }
    }
}
