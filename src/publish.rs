use crate::app::AppContext;
use crate::aspects::{build_base_aspects, localize_aspects};
use crate::catalog::{MarketplaceEntry, MarketplaceId};
use crate::category::sanitize_category_id;
use crate::ebay::error::UpstreamClass;
use crate::ebay::inventory::{InventoryItemRequest, InventoryProduct, Removal};
use crate::ebay::offers::{
    Amount, ListingPolicies, OfferRequest, OfferSummary, PricingSummary, ShippingCostOverride,
};
use crate::ebay::{CreateOutcome, UpstreamError};
use crate::error::{MarketplaceFailure, OrchestratorError};
use crate::models::{Draft, DraftStatus, MarketplaceListing, PerMarketplaceResult};
use crate::profile::{self, Profile, Settings};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// eBay rejects longer titles.
pub const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    /// Correlates the log lines of one publish call.
    pub run_id: Uuid,
    pub draft_id: String,
    pub status: DraftStatus,
    pub results: BTreeMap<String, PerMarketplaceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PublishReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, result)| result.success)
            .map(|(code, _)| code.as_str())
    }
}

struct Published {
    listing: MarketplaceListing,
    attempts: u32,
    reused: bool,
}

struct Failed {
    sku: Option<String>,
    offer_id: Option<String>,
    failure: MarketplaceFailure,
}

impl Failed {
    fn new(failure: impl Into<MarketplaceFailure>) -> Self {
        Self {
            sku: None,
            offer_id: None,
            failure: failure.into(),
        }
    }

    fn at(sku: &str, offer_id: Option<&str>, failure: impl Into<MarketplaceFailure>) -> Self {
        Self {
            sku: Some(sku.to_string()),
            offer_id: offer_id.map(str::to_string),
            failure: failure.into(),
        }
    }
}

/// State shared by all marketplaces of one run.
struct PublishRun<'a> {
    draft: &'a Draft,
    settings: Settings,
    base_aspects: BTreeMap<String, Vec<String>>,
    image_urls: Vec<String>,
    price_overrides: &'a BTreeMap<String, f64>,
    /// Location keys already ensured in this run, with their outcome.
    locations: HashMap<String, Result<(), UpstreamError>>,
}

/// `{base}-{CC}`, one inventory record per marketplace.
pub fn scoped_sku(base_sku: &str, entry: &MarketplaceEntry) -> String {
    format!("{}-{}", base_sku.trim(), entry.sku_suffix())
}

/// Makes upload paths and bare file names absolute against `base_url`.
pub fn absolute_image_urls(urls: &[String], base_url: Option<&str>) -> Vec<String> {
    urls.iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(|url| {
            if url.starts_with("http://") || url.starts_with("https://") {
                return url.to_string();
            }
            match base_url.map(|base| base.trim_end_matches('/')) {
                Some(base) if url.starts_with('/') => format!("{base}{url}"),
                Some(base) => format!("{base}/api/uploads/{url}"),
                None => url.to_string(),
            }
        })
        .collect()
}

pub fn check_preconditions(draft: &Draft) -> Result<(), OrchestratorError> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(OrchestratorError::invalid_input(
            "preconditions",
            "draft has no title",
        ));
    }
    let length = title.chars().count();
    if length > MAX_TITLE_CHARS {
        return Err(OrchestratorError::invalid_input(
            "preconditions",
            format!("title is {length} characters, eBay allows {MAX_TITLE_CHARS}"),
        ));
    }
    if !draft.image_urls.iter().any(|url| !url.trim().is_empty()) {
        return Err(OrchestratorError::invalid_input(
            "preconditions",
            "draft has no images",
        ));
    }
    Ok(())
}

/// Canonical codes where known, raw upper-cased input otherwise; first
/// occurrence wins.
fn normalize_targets(marketplace_ids: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for raw in marketplace_ids {
        let code = match raw.parse::<MarketplaceId>() {
            Ok(id) => id.ebay_code().to_string(),
            Err(_) => raw.trim().to_uppercase(),
        };
        if !code.is_empty() && !seen.contains(&code) {
            seen.push(code);
        }
    }
    seen
}

fn override_for(overrides: &BTreeMap<String, f64>, marketplace: MarketplaceId) -> Option<f64> {
    overrides
        .iter()
        .find(|(key, _)| key.parse::<MarketplaceId>().ok() == Some(marketplace))
        .map(|(_, price)| *price)
        .filter(|price| price.is_finite() && *price > 0.0)
}

fn failure_summary(results: &BTreeMap<String, PerMarketplaceResult>) -> Option<String> {
    let failures: Vec<String> = results
        .iter()
        .filter(|(_, result)| !result.success)
        .map(|(code, result)| format!("{code}: {}", result.error.as_deref().unwrap_or("failed")))
        .collect();
    (!failures.is_empty()).then(|| failures.join("; "))
}

impl AppContext {
    /// Publishes `draft_id` to each marketplace in `marketplace_ids`.
    ///
    /// Only a missing draft, an unusable title, missing images or an empty
    /// target list abort the call. Every other problem ends up in the
    /// per-marketplace result map.
    pub async fn publish(
        &self,
        draft_id: &str,
        marketplace_ids: &[String],
        price_overrides: &BTreeMap<String, f64>,
    ) -> Result<PublishReport, OrchestratorError> {
        let _guard = self.locks.acquire(draft_id).await;
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let draft = self
            .drafts
            .get_draft(draft_id)
            .await
            .map_err(|err| OrchestratorError::store("load_draft", err))?;
        check_preconditions(&draft)?;
        let targets = normalize_targets(marketplace_ids);
        if targets.is_empty() {
            return Err(OrchestratorError::invalid_input(
                "preconditions",
                "no marketplaces requested",
            ));
        }
        let settings = self
            .settings
            .load_settings()
            .await
            .map_err(|err| OrchestratorError::store("load_settings", err))?;

        info!(
            target = "crosslist.publish",
            run_id = %run_id,
            draft_id = %draft_id,
            marketplaces = ?targets,
            "publish_started"
        );

        let mut run = PublishRun {
            draft: &draft,
            settings,
            base_aspects: build_base_aspects(&draft.aspects, draft.item_type()),
            image_urls: absolute_image_urls(
                &draft.image_urls,
                self.config.public_base_url.as_deref(),
            ),
            price_overrides,
            locations: HashMap::new(),
        };

        let mut results = BTreeMap::new();
        for code in targets {
            let step_started = Instant::now();
            let (result, listing) = match self.publish_marketplace(&mut run, &code).await {
                Ok(published) => {
                    info!(
                        target = "crosslist.publish",
                        draft_id = %draft_id,
                        marketplace = %code,
                        listing_id = ?published.listing.listing_id,
                        reused = published.reused,
                        attempts = published.attempts,
                        "marketplace_published"
                    );
                    crate::metrics::marketplace_outcome(
                        "publish",
                        &code,
                        if published.reused { "reused" } else { "published" },
                    );
                    (
                        PerMarketplaceResult::success(
                            &published.listing,
                            published.attempts,
                            published.reused,
                        ),
                        Some(published.listing),
                    )
                }
                Err(failed) => {
                    let kind = failed.failure.kind();
                    warn!(
                        target = "crosslist.publish",
                        draft_id = %draft_id,
                        marketplace = %code,
                        kind = kind.as_str(),
                        attempts = failed.failure.attempts(),
                        error = %failed.failure,
                        "marketplace_publish_failed"
                    );
                    crate::metrics::marketplace_outcome("publish", &code, kind.as_str());
                    (
                        PerMarketplaceResult::failure(failed.sku, failed.offer_id, &failed.failure),
                        None,
                    )
                }
            };
            crate::metrics::step_elapsed("publish_marketplace", step_started.elapsed().as_millis());

            if let Err(err) = self
                .drafts
                .record_marketplace_result(draft_id, &code, &result, listing.as_ref())
                .await
            {
                error!(
                    target = "crosslist.publish",
                    draft_id = %draft_id,
                    marketplace = %code,
                    error = %err,
                    "marketplace_result_write_failed"
                );
            }
            results.insert(code, result);
        }

        let had_listings = self
            .drafts
            .get_draft(draft_id)
            .await
            .map(|current| !current.marketplace_listings.is_empty())
            .unwrap_or(!draft.marketplace_listings.is_empty());
        let any_success = results.values().any(|result| result.success);
        let status = if any_success || had_listings {
            DraftStatus::Published
        } else {
            DraftStatus::Error
        };
        let error_message = failure_summary(&results);
        self.drafts
            .set_status(draft_id, status, error_message.clone())
            .await
            .map_err(|err| OrchestratorError::store("save_status", err))?;

        crate::metrics::step_elapsed("publish", started.elapsed().as_millis());
        info!(
            target = "crosslist.publish",
            run_id = %run_id,
            draft_id = %draft_id,
            status = ?status,
            succeeded = results.values().filter(|r| r.success).count(),
            failed = results.values().filter(|r| !r.success).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "publish_finished"
        );

        Ok(PublishReport {
            run_id,
            draft_id: draft_id.to_string(),
            status,
            results,
            error_message,
        })
    }

    async fn publish_marketplace(
        &self,
        run: &mut PublishRun<'_>,
        code: &str,
    ) -> Result<Published, Failed> {
        let marketplace = code
            .parse::<MarketplaceId>()
            .map_err(|_| Failed::new(MarketplaceFailure::UnknownMarketplace(code.to_string())))?;
        let profile = profile::resolve(code, &run.settings)
            .ok_or_else(|| Failed::new(MarketplaceFailure::UnknownMarketplace(code.to_string())))?;
        let missing = profile::validate_for_publish(&profile);
        if !missing.is_empty() {
            return Err(Failed::new(MarketplaceFailure::MissingConfiguration(missing)));
        }
        let entry = profile.entry;

        if run.draft.sku.trim().is_empty() {
            return Err(Failed::new(MarketplaceFailure::Unresolvable(
                "draft has no SKU".to_string(),
            )));
        }
        let sku = scoped_sku(&run.draft.sku, entry);

        let item = InventoryItemRequest::single_unit(
            &run.draft.condition,
            InventoryProduct {
                title: run.draft.title.trim().to_string(),
                description: run.draft.description.clone(),
                aspects: localize_aspects(&run.base_aspects, entry),
                image_urls: run.image_urls.clone(),
            },
        );
        self.ebay
            .upsert_inventory_item(entry, &sku, &item)
            .await
            .map_err(|err| Failed::at(&sku, None, err))?;

        // Validated non-empty above.
        let location_key = profile.merchant_location_key.clone().unwrap_or_default();
        self.ensure_location_once(run, &location_key)
            .await
            .map_err(|err| Failed::at(&sku, None, err))?;

        let category_id = match run.draft.category_override(marketplace) {
            Some(raw) => sanitize_category_id(raw).ok_or_else(|| {
                Failed::at(
                    &sku,
                    None,
                    MarketplaceFailure::Unresolvable(format!(
                        "category `{raw}` has no numeric id"
                    )),
                )
            })?,
            None => {
                self.categories
                    .resolve_category(marketplace, run.draft.item_type(), &run.draft.title)
                    .await
                    .category_id
            }
        };

        let price = self.select_price(run, &profile).await;
        let payload = offer_payload(run.draft, &profile, &sku, &category_id, &location_key, price);

        let offers = self
            .ebay
            .list_offers(entry, &sku)
            .await
            .map_err(|err| Failed::at(&sku, None, err))?;

        // A live listing already exists: reuse it instead of publishing again.
        if let Some((offer, listing_id)) = offers
            .iter()
            .find_map(|offer| offer.listing_id().filter(|_| offer.is_published()).map(|id| (offer, id)))
        {
            return Ok(Published {
                listing: MarketplaceListing {
                    sku: sku.clone(),
                    offer_id: Some(offer.offer_id.clone()),
                    listing_id: Some(listing_id.to_string()),
                    listing_url: Some(self.ebay.config().listing_url(entry, listing_id)),
                    published_at: Some(Utc::now()),
                },
                attempts: 0,
                reused: true,
            });
        }

        let offer_id = self
            .reconcile_offer(entry, &sku, offers.first(), &payload)
            .await
            .map_err(|err| Failed::at(&sku, None, err))?;

        let published = self
            .ebay
            .publish_offer(entry, &offer_id)
            .await
            .map_err(|err| Failed::at(&sku, Some(&offer_id), err))?;

        Ok(Published {
            listing: MarketplaceListing {
                sku: sku.clone(),
                offer_id: Some(offer_id),
                listing_url: Some(self.ebay.config().listing_url(entry, &published.listing_id)),
                listing_id: Some(published.listing_id),
                published_at: Some(Utc::now()),
            },
            attempts: published.attempts,
            reused: false,
        })
    }

    /// Returns the id of an unpublished offer that carries `payload`.
    async fn reconcile_offer(
        &self,
        entry: &MarketplaceEntry,
        sku: &str,
        existing: Option<&OfferSummary>,
        payload: &OfferRequest,
    ) -> Result<String, UpstreamError> {
        if let Some(offer) = existing {
            if offer.is_published() {
                self.ebay.update_offer(entry, &offer.offer_id, payload).await?;
                return Ok(offer.offer_id.clone());
            }
            match self.ebay.delete_offer(entry, &offer.offer_id).await {
                Ok(Removal::Removed | Removal::AlreadyGone) => {}
                Err(err) => {
                    warn!(
                        target = "crosslist.publish",
                        sku = %sku,
                        offer_id = %offer.offer_id,
                        error = %err,
                        "stale_offer_delete_failed_updating_instead"
                    );
                    self.ebay.update_offer(entry, &offer.offer_id, payload).await?;
                    return Ok(offer.offer_id.clone());
                }
            }
        }

        match self.ebay.create_offer(entry, payload).await {
            CreateOutcome::Created(offer_id) => Ok(offer_id),
            CreateOutcome::AlreadyExists(Some(offer_id)) => {
                self.ebay.update_offer(entry, &offer_id, payload).await?;
                Ok(offer_id)
            }
            CreateOutcome::AlreadyExists(None) => {
                let offer_id = self
                    .ebay
                    .list_offers(entry, sku)
                    .await?
                    .into_iter()
                    .next()
                    .map(|offer| offer.offer_id)
                    .ok_or_else(|| UpstreamError {
                        operation: "create_offer",
                        class: UpstreamClass::Permanent,
                        status: None,
                        message: "offer reported as existing but not listed".to_string(),
                        attempts: 1,
                    })?;
                self.ebay.update_offer(entry, &offer_id, payload).await?;
                Ok(offer_id)
            }
            CreateOutcome::Failed(err) => Err(err),
        }
    }

    async fn ensure_location_once(
        &self,
        run: &mut PublishRun<'_>,
        key: &str,
    ) -> Result<(), UpstreamError> {
        if let Some(outcome) = run.locations.get(key) {
            return outcome.clone();
        }
        let outcome = match self.ebay.ensure_location(key, &run.settings.shipping_origin).await {
            CreateOutcome::Created(_) => {
                info!(target = "crosslist.publish", location_key = %key, "location_created");
                Ok(())
            }
            CreateOutcome::AlreadyExists(_) => Ok(()),
            CreateOutcome::Failed(err) => Err(err),
        };
        run.locations.insert(key.to_string(), outcome.clone());
        outcome
    }

    /// Override, then operator price, then the draft price converted from the
    /// base currency, then the catalog default.
    async fn select_price(&self, run: &PublishRun<'_>, profile: &Profile) -> f64 {
        if let Some(price) = override_for(run.price_overrides, profile.marketplace) {
            return price;
        }
        if let Some(price) = profile.price {
            return price;
        }
        if let Some(base) = run.draft.price.filter(|p| p.is_finite() && *p > 0.0) {
            let converted = self
                .currency
                .convert(base, &self.config.base_currency, profile.currency())
                .await;
            return (converted * 100.0).round() / 100.0;
        }
        profile.entry.default_price
    }
}

fn offer_payload(
    draft: &Draft,
    profile: &Profile,
    sku: &str,
    category_id: &str,
    location_key: &str,
    price: f64,
) -> OfferRequest {
    let currency = profile.currency();
    let description = if draft.description.trim().is_empty() {
        draft.title.trim().to_string()
    } else {
        draft.description.clone()
    };
    OfferRequest {
        sku: sku.to_string(),
        marketplace_id: profile.marketplace.ebay_code().to_string(),
        format: "FIXED_PRICE",
        category_id: category_id.to_string(),
        listing_description: description,
        pricing_summary: PricingSummary {
            price: Amount::new(price, currency),
        },
        available_quantity: 1,
        merchant_location_key: location_key.to_string(),
        listing_policies: ListingPolicies {
            fulfillment_policy_id: profile.policies.fulfillment.clone().unwrap_or_default(),
            payment_policy_id: profile.policies.payment.clone().unwrap_or_default(),
            return_policy_id: profile.policies.return_policy.clone().unwrap_or_default(),
            shipping_cost_overrides: vec![ShippingCostOverride {
                priority: 1,
                shipping_service_type: "DOMESTIC",
                shipping_cost: Amount::new(profile.shipping_cost, currency),
            }],
        },
    }
}
