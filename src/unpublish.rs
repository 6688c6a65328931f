use crate::app::AppContext;
use crate::catalog::MarketplaceId;
use crate::ebay::{Removal, UpstreamError};
use crate::error::OrchestratorError;
use crate::models::{Draft, DraftStatus};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpublishScope {
    Marketplace(String),
    All,
}

impl UnpublishScope {
    /// `None`, empty or `"all"` widen the scope to every marketplace.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => UnpublishScope::All,
            Some(value) if value.eq_ignore_ascii_case("all") => UnpublishScope::All,
            Some(value) => UnpublishScope::Marketplace(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TeardownError {
    pub marketplace: String,
    pub sku: String,
    pub step: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnpublishReport {
    pub draft_id: String,
    pub marketplaces: Vec<String>,
    pub status: DraftStatus,
    pub deleted: bool,
    /// Remote steps that failed; local state was updated regardless.
    pub errors: Vec<TeardownError>,
}

impl UnpublishReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Draft map keys covered by `scope`. A single marketplace always yields at
/// least its canonical code; `All` on a draft with nothing recorded covers
/// every catalog marketplace so legacy listings under the base SKU are found.
fn scoped_keys(draft: &Draft, scope: &UnpublishScope) -> Vec<String> {
    let known: BTreeSet<&String> = draft
        .marketplace_listings
        .keys()
        .chain(draft.multi_marketplace_results.keys())
        .collect();
    match scope {
        UnpublishScope::All if known.is_empty() && !draft.sku.trim().is_empty() => {
            MarketplaceId::ALL
                .iter()
                .map(|id| id.ebay_code().to_string())
                .collect()
        }
        UnpublishScope::All => known.into_iter().cloned().collect(),
        UnpublishScope::Marketplace(raw) => match raw.parse::<MarketplaceId>() {
            Ok(id) => {
                let mut keys: Vec<String> = known
                    .into_iter()
                    .filter(|key| key.parse::<MarketplaceId>().ok() == Some(id))
                    .cloned()
                    .collect();
                if keys.is_empty() {
                    keys.push(id.ebay_code().to_string());
                }
                keys
            }
            Err(_) => vec![raw.trim().to_string()],
        },
    }
}

/// Scoped SKUs recorded for one marketplace key; the base SKU when the draft
/// predates per-marketplace SKUs.
fn known_skus(draft: &Draft, key: &str) -> Vec<String> {
    let mut skus = BTreeSet::new();
    if let Some(listing) = draft.marketplace_listings.get(key) {
        skus.insert(listing.sku.clone());
    }
    if let Some(sku) = draft
        .multi_marketplace_results
        .get(key)
        .and_then(|result| result.sku.clone())
    {
        skus.insert(sku);
    }
    skus.retain(|sku| !sku.trim().is_empty());
    if skus.is_empty() && !draft.sku.trim().is_empty() {
        skus.insert(draft.sku.trim().to_string());
    }
    skus.into_iter().collect()
}

impl AppContext {
    pub async fn unpublish(
        &self,
        draft_id: &str,
        scope: UnpublishScope,
    ) -> Result<UnpublishReport, OrchestratorError> {
        let _guard = self.locks.acquire(draft_id).await;
        let started = Instant::now();
        let draft = self
            .drafts
            .get_draft(draft_id)
            .await
            .map_err(|err| OrchestratorError::store("load_draft", err))?;

        let keys = scoped_keys(&draft, &scope);
        let errors = self.teardown(&draft, &keys).await;

        let mut remaining = draft.clone();
        for key in &keys {
            match self.drafts.remove_marketplace(draft_id, key).await {
                Ok(updated) => remaining = updated,
                Err(err) => {
                    return Err(OrchestratorError::store("remove_marketplace", err));
                }
            }
        }

        let status = if remaining.marketplace_listings.is_empty() {
            if remaining.is_complete() {
                DraftStatus::Ready
            } else {
                DraftStatus::Draft
            }
        } else {
            remaining.status
        };
        let error_message = if status == DraftStatus::Published {
            remaining.error_message.clone()
        } else {
            None
        };
        self.drafts
            .set_status(draft_id, status, error_message)
            .await
            .map_err(|err| OrchestratorError::store("save_status", err))?;

        crate::metrics::step_elapsed("unpublish", started.elapsed().as_millis());
        info!(
            target = "crosslist.unpublish",
            draft_id = %draft_id,
            marketplaces = ?keys,
            status = ?status,
            remote_errors = errors.len(),
            "unpublish_finished"
        );
        Ok(UnpublishReport {
            draft_id: draft_id.to_string(),
            marketplaces: keys,
            status,
            deleted: false,
            errors,
        })
    }

    /// Tears down every marketplace, then deletes the draft itself.
    pub async fn delete_draft(&self, draft_id: &str) -> Result<UnpublishReport, OrchestratorError> {
        let _guard = self.locks.acquire(draft_id).await;
        let draft = self
            .drafts
            .get_draft(draft_id)
            .await
            .map_err(|err| OrchestratorError::store("load_draft", err))?;
        let keys = scoped_keys(&draft, &UnpublishScope::All);
        let errors = self.teardown(&draft, &keys).await;
        self.drafts
            .delete_draft(draft_id)
            .await
            .map_err(|err| OrchestratorError::store("delete_draft", err))?;
        info!(
            target = "crosslist.unpublish",
            draft_id = %draft_id,
            marketplaces = ?keys,
            remote_errors = errors.len(),
            "draft_deleted"
        );
        Ok(UnpublishReport {
            draft_id: draft_id.to_string(),
            marketplaces: keys,
            status: draft.status,
            deleted: true,
            errors,
        })
    }

    async fn teardown(&self, draft: &Draft, keys: &[String]) -> Vec<TeardownError> {
        let mut errors = Vec::new();
        for key in keys {
            let Ok(marketplace) = key.parse::<MarketplaceId>() else {
                warn!(
                    target = "crosslist.unpublish",
                    draft_id = %draft.id,
                    marketplace = %key,
                    "teardown_unknown_marketplace"
                );
                errors.push(TeardownError {
                    marketplace: key.clone(),
                    sku: draft.sku.clone(),
                    step: "resolve_marketplace",
                    message: format!("unknown marketplace `{key}`"),
                });
                continue;
            };
            for sku in known_skus(draft, key) {
                let before = errors.len();
                self.teardown_sku(marketplace, key, &sku, &mut errors).await;
                let outcome = if errors.len() == before { "removed" } else { "partial" };
                crate::metrics::marketplace_outcome("unpublish", key, outcome);
            }
        }
        errors
    }

    async fn teardown_sku(
        &self,
        marketplace: MarketplaceId,
        key: &str,
        sku: &str,
        errors: &mut Vec<TeardownError>,
    ) {
        let entry = marketplace.entry();
        let mut record = |step: &'static str, err: UpstreamError| {
            error!(
                target = "crosslist.unpublish",
                marketplace = %key,
                sku = %sku,
                step,
                error = %err,
                "teardown_step_failed"
            );
            errors.push(TeardownError {
                marketplace: key.to_string(),
                sku: sku.to_string(),
                step,
                message: err.to_string(),
            });
        };

        match self.ebay.list_offers(entry, sku).await {
            Ok(offers) => {
                for offer in offers {
                    if offer.is_published()
                        && let Err(err) = self.ebay.withdraw_offer(entry, &offer.offer_id).await
                    {
                        record("withdraw_offer", err);
                    }
                    match self.ebay.delete_offer(entry, &offer.offer_id).await {
                        Ok(Removal::Removed) => {}
                        Ok(Removal::AlreadyGone) => info!(
                            target = "crosslist.unpublish",
                            offer_id = %offer.offer_id,
                            "offer_already_gone"
                        ),
                        Err(err) => record("delete_offer", err),
                    }
                }
            }
            Err(err) => record("list_offers", err),
        }

        match self.ebay.delete_inventory_item(entry, sku).await {
            Ok(Removal::Removed) => {}
            Ok(Removal::AlreadyGone) => info!(
                target = "crosslist.unpublish",
                sku = %sku,
                "inventory_item_already_gone"
            ),
            Err(err) => record("delete_inventory_item", err),
        }
    }
}
