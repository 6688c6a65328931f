use crate::cache::CacheStore;
use crate::catalog::{ItemType, MarketplaceId, UNIVERSAL_FALLBACK_CATEGORY};
use crate::ebay::EbayClient;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    Override,
    Cache,
    Live,
    Static,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryResolution {
    pub category_id: String,
    pub source: CategorySource,
}

/// Keeps the leading run of digits: `"63632 - Wheels"` becomes `"63632"`.
pub fn sanitize_category_id(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!digits.is_empty()).then_some(digits)
}

pub struct CategoryResolver {
    ebay: Arc<EbayClient>,
    suggestions: Arc<dyn CacheStore<String>>,
    aspects: Arc<dyn CacheStore<Vec<String>>>,
    ttl: Duration,
}

impl CategoryResolver {
    pub fn new(
        ebay: Arc<EbayClient>,
        suggestions: Arc<dyn CacheStore<String>>,
        aspects: Arc<dyn CacheStore<Vec<String>>>,
        ttl: Duration,
    ) -> Self {
        Self {
            ebay,
            suggestions,
            aspects,
            ttl,
        }
    }

    /// Never fails; the worst case is the universal fallback category.
    pub async fn resolve_category(
        &self,
        marketplace: MarketplaceId,
        item_type: Option<ItemType>,
        query: &str,
    ) -> CategoryResolution {
        let phrase = match item_type {
            Some(item_type) => item_type.search_phrase().to_string(),
            None => query.trim().to_lowercase(),
        };
        if !phrase.is_empty() {
            let key = format!("category:{}:{}", marketplace, phrase);
            if let Some(id) = self
                .suggestions
                .get(&key)
                .await
                .as_deref()
                .and_then(sanitize_category_id)
            {
                crate::metrics::cache_lookup("category", true);
                return CategoryResolution {
                    category_id: id,
                    source: CategorySource::Cache,
                };
            }
            crate::metrics::cache_lookup("category", false);

            match self.ebay.category_suggestions(marketplace.entry(), &phrase).await {
                Ok(suggestions) => {
                    let first = suggestions
                        .first()
                        .and_then(|s| sanitize_category_id(&s.category_id));
                    if let Some(id) = first {
                        debug!(
                            target = "crosslist.category",
                            marketplace = %marketplace,
                            query = %phrase,
                            category_id = %id,
                            "category_suggested"
                        );
                        self.suggestions.set(&key, id.clone(), Some(self.ttl)).await;
                        return CategoryResolution {
                            category_id: id,
                            source: CategorySource::Live,
                        };
                    }
                    warn!(
                        target = "crosslist.category",
                        marketplace = %marketplace,
                        query = %phrase,
                        "category_suggestions_empty"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "crosslist.category",
                        marketplace = %marketplace,
                        query = %phrase,
                        error = %err,
                        "category_suggestion_failed"
                    );
                }
            }
        }

        match item_type
            .and_then(|item_type| item_type.fallback_category(marketplace))
            .and_then(sanitize_category_id)
        {
            Some(id) => CategoryResolution {
                category_id: id,
                source: CategorySource::Static,
            },
            None => CategoryResolution {
                category_id: UNIVERSAL_FALLBACK_CATEGORY.to_string(),
                source: CategorySource::Fallback,
            },
        }
    }

    /// Names of the aspects eBay requires for a category. Empty on lookup failure.
    pub async fn required_aspects(&self, marketplace: MarketplaceId, category_id: &str) -> Vec<String> {
        let Some(category_id) = sanitize_category_id(category_id) else {
            return Vec::new();
        };
        let key = format!("aspects:{}:{}", marketplace, category_id);
        if let Some(names) = self.aspects.get(&key).await {
            crate::metrics::cache_lookup("aspects", true);
            return names;
        }
        crate::metrics::cache_lookup("aspects", false);
        match self.ebay.item_aspects(marketplace.entry(), &category_id).await {
            Ok(aspects) => {
                let names: Vec<String> = aspects
                    .into_iter()
                    .filter(|aspect| aspect.is_required())
                    .map(|aspect| aspect.localized_aspect_name)
                    .collect();
                self.aspects.set(&key, names.clone(), Some(self.ttl)).await;
                names
            }
            Err(err) => {
                warn!(
                    target = "crosslist.category",
                    marketplace = %marketplace,
                    category_id = %category_id,
                    error = %err,
                    "required_aspects_lookup_failed"
                );
                Vec::new()
            }
        }
    }
}
