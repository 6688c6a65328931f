use crate::app::AppContext;
use crate::catalog::MarketplaceId;
use crate::ebay::CreateOutcome;
use crate::ebay::account::{PolicyKind, policy_payload};
use crate::error::{ErrorKind, OrchestratorError};
use crate::profile::{self, PolicyOverride, Settings};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Created { id: String },
    Existing { id: Option<String> },
    Failed { kind: ErrorKind, error: String },
}

impl StepOutcome {
    fn from_create(outcome: CreateOutcome) -> Self {
        match outcome {
            CreateOutcome::Created(id) => StepOutcome::Created { id },
            CreateOutcome::AlreadyExists(id) => StepOutcome::Existing { id },
            CreateOutcome::Failed(err) => StepOutcome::Failed {
                kind: if err.is_transient() {
                    ErrorKind::TransientUpstreamError
                } else {
                    ErrorKind::PermanentUpstreamError
                },
                error: err.to_string(),
            },
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            StepOutcome::Created { id } => Some(id.as_str()),
            StepOutcome::Existing { id } => id.as_deref(),
            StepOutcome::Failed { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, StepOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSource {
    Settings,
    Live,
    Catalog,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketplaceBootstrap {
    pub location_key: String,
    pub location: StepOutcome,
    pub shipping_service: String,
    pub shipping_service_source: ServiceSource,
    pub policies: BTreeMap<PolicyKind, StepOutcome>,
}

impl MarketplaceBootstrap {
    pub fn is_ready(&self) -> bool {
        self.location.is_ok() && self.policies.values().all(|p| p.id().is_some())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub results: BTreeMap<String, MarketplaceBootstrap>,
    /// Requested ids outside the catalog.
    pub unknown: Vec<String>,
}

impl AppContext {
    /// Provisions each marketplace and merges the resulting ids into the
    /// persisted settings. Safe to rerun: existing entities are reused.
    pub async fn bootstrap_marketplaces(
        &self,
        marketplace_ids: &[String],
    ) -> Result<BootstrapReport, OrchestratorError> {
        let mut settings = self
            .settings
            .load_settings()
            .await
            .map_err(|err| OrchestratorError::store("load_settings", err))?;

        let mut report = BootstrapReport {
            results: BTreeMap::new(),
            unknown: Vec::new(),
        };
        let mut targets: Vec<MarketplaceId> = Vec::new();
        for raw in marketplace_ids {
            match raw.parse::<MarketplaceId>() {
                Ok(id) if !targets.contains(&id) => targets.push(id),
                Ok(_) => {}
                Err(_) => report.unknown.push(raw.clone()),
            }
        }
        if targets.is_empty() && report.unknown.is_empty() {
            targets.extend(MarketplaceId::ALL);
        }

        for id in targets {
            let outcome = self.bootstrap_one(id, &settings).await;
            merge_into(&mut settings, id, &outcome);
            info!(
                target = "crosslist.bootstrap",
                marketplace = %id,
                ready = outcome.is_ready(),
                shipping_service = %outcome.shipping_service,
                "marketplace_bootstrapped"
            );
            crate::metrics::marketplace_outcome(
                "bootstrap",
                id.ebay_code(),
                if outcome.is_ready() { "ready" } else { "incomplete" },
            );
            report.results.insert(id.ebay_code().to_string(), outcome);
        }

        self.settings
            .save_settings(&settings)
            .await
            .map_err(|err| OrchestratorError::store("save_settings", err))?;
        Ok(report)
    }

    async fn bootstrap_one(&self, id: MarketplaceId, settings: &Settings) -> MarketplaceBootstrap {
        let entry = id.entry();
        // Known ids always resolve.
        let profile = profile::resolve(id.ebay_code(), settings)
            .unwrap_or_else(|| profile::Profile::from_entry(entry));

        let location_key = profile
            .merchant_location_key
            .clone()
            .unwrap_or_else(|| entry.default_location_key.to_string());
        let location = StepOutcome::from_create(
            self.ebay
                .ensure_location(&location_key, &settings.shipping_origin)
                .await,
        );

        let (shipping_service, shipping_service_source) =
            self.choose_shipping_service(id, settings).await;

        let mut policies = BTreeMap::new();
        for kind in PolicyKind::ALL {
            let configured = match kind {
                PolicyKind::Fulfillment => profile.policies.fulfillment.clone(),
                PolicyKind::Payment => profile.policies.payment.clone(),
                PolicyKind::Return => profile.policies.return_policy.clone(),
            };
            let outcome = match configured {
                Some(policy_id) => StepOutcome::Existing {
                    id: Some(policy_id),
                },
                None => {
                    self.ensure_policy(kind, id, &shipping_service, profile.shipping_cost)
                        .await
                }
            };
            policies.insert(kind, outcome);
        }

        MarketplaceBootstrap {
            location_key,
            location,
            shipping_service,
            shipping_service_source,
            policies,
        }
    }

    /// Settings, then the first usable domestic service eBay lists, then the
    /// catalog fallback.
    async fn choose_shipping_service(
        &self,
        id: MarketplaceId,
        settings: &Settings,
    ) -> (String, ServiceSource) {
        let entry = id.entry();
        if let Some(code) = settings
            .for_marketplace(id)
            .and_then(|s| s.shipping_service_code.as_deref())
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            return (code.to_string(), ServiceSource::Settings);
        }
        match self.ebay.shipping_services(entry).await {
            Ok(services) => {
                let usable: Vec<&str> = services
                    .iter()
                    .filter(|s| s.is_usable())
                    .map(|s| s.shipping_service_code.as_str())
                    .collect();
                let preferred = usable
                    .iter()
                    .find(|code| **code == entry.fallback_shipping_service)
                    .or_else(|| usable.first());
                if let Some(code) = preferred {
                    return (code.to_string(), ServiceSource::Live);
                }
            }
            Err(err) => warn!(
                target = "crosslist.bootstrap",
                marketplace = %id,
                error = %err,
                "shipping_services_lookup_failed"
            ),
        }
        (
            entry.fallback_shipping_service.to_string(),
            ServiceSource::Catalog,
        )
    }

    async fn ensure_policy(
        &self,
        kind: PolicyKind,
        id: MarketplaceId,
        shipping_service: &str,
        shipping_cost: f64,
    ) -> StepOutcome {
        let entry = id.entry();
        let name = kind.default_name(entry);
        match self.ebay.list_policies(kind, entry).await {
            Ok(existing) => {
                if let Some(policy) = existing.into_iter().find(|p| p.name == name) {
                    return StepOutcome::Existing {
                        id: Some(policy.id),
                    };
                }
            }
            Err(err) => warn!(
                target = "crosslist.bootstrap",
                marketplace = %id,
                policy = kind.as_str(),
                error = %err,
                "policy_lookup_failed"
            ),
        }
        let payload = policy_payload(kind, entry, shipping_service, shipping_cost);
        StepOutcome::from_create(self.ebay.create_policy(kind, payload).await)
    }
}

fn merge_into(settings: &mut Settings, id: MarketplaceId, outcome: &MarketplaceBootstrap) {
    let target = settings.marketplace_mut(id);
    if outcome.location.is_ok() {
        target.merchant_location_key = Some(outcome.location_key.clone());
    }
    target.shipping_service_code = Some(outcome.shipping_service.clone());

    let policies = target.policies.get_or_insert_with(PolicyOverride::default);
    for (kind, step) in &outcome.policies {
        let Some(policy_id) = step.id() else { continue };
        let slot = match kind {
            PolicyKind::Fulfillment => &mut policies.fulfillment,
            PolicyKind::Payment => &mut policies.payment,
            PolicyKind::Return => &mut policies.return_policy,
        };
        *slot = Some(policy_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEbay, test_context_with};

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn fresh_marketplace_becomes_publish_ready() {
        let fake = FakeEbay::new();
        let ctx = test_context_with(fake.clone(), Settings::default());

        let report = ctx.bootstrap_marketplaces(&codes(&["EBAY_DE"])).await.unwrap();
        let de = &report.results["EBAY_DE"];
        assert!(de.is_ready());
        assert!(matches!(de.location, StepOutcome::Created { .. }));
        assert_eq!(de.shipping_service, "DE_DHLPaket");
        assert_eq!(de.shipping_service_source, ServiceSource::Catalog);
        assert_eq!(fake.policy_count(), 3);

        let settings = ctx.settings.load_settings().await.unwrap();
        let profile = profile::resolve("EBAY_DE", &settings).unwrap();
        assert!(profile::validate_for_publish(&profile).is_empty());
        assert_eq!(profile.merchant_location_key.as_deref(), Some("location_de"));
        for (kind, slot) in [
            (PolicyKind::Fulfillment, &profile.policies.fulfillment),
            (PolicyKind::Payment, &profile.policies.payment),
            (PolicyKind::Return, &profile.policies.return_policy),
        ] {
            assert_eq!(slot.as_deref(), de.policies[&kind].id());
        }

        let json = serde_json::to_value(de).unwrap();
        assert_eq!(json["policies"]["return"]["outcome"], "created");
    }

    #[tokio::test]
    async fn rerun_reuses_everything() {
        let fake = FakeEbay::new();
        let ctx = test_context_with(fake.clone(), Settings::default());
        ctx.bootstrap_marketplaces(&codes(&["EBAY_GB"])).await.unwrap();
        let account_calls = fake.calls_matching("/sell/account/");

        let report = ctx.bootstrap_marketplaces(&codes(&["EBAY_GB"])).await.unwrap();
        let gb = &report.results["EBAY_GB"];
        assert!(matches!(gb.location, StepOutcome::Existing { .. }));
        assert!(gb.policies.values().all(|p| matches!(p, StepOutcome::Existing { .. })));
        assert_eq!(gb.shipping_service_source, ServiceSource::Settings);
        assert_eq!(fake.policy_count(), 3);
        assert_eq!(fake.calls_matching("/sell/account/"), account_calls);
    }

    #[tokio::test]
    async fn existing_policy_is_matched_by_name() {
        let fake = FakeEbay::new();
        let existing = fake.seed_policy("payment", "EBAY_IT", "Crosslist Payment IT");
        let ctx = test_context_with(fake.clone(), Settings::default());

        let report = ctx.bootstrap_marketplaces(&codes(&["EBAY_IT"])).await.unwrap();
        assert_eq!(
            report.results["EBAY_IT"].policies[&PolicyKind::Payment],
            StepOutcome::Existing {
                id: Some(existing.clone())
            }
        );
        let settings = ctx.settings.load_settings().await.unwrap();
        let profile = profile::resolve("EBAY_IT", &settings).unwrap();
        assert_eq!(profile.policies.payment, Some(existing));
        assert_eq!(fake.policy_count(), 3);
    }

    #[tokio::test]
    async fn live_shipping_service_skips_international_options() {
        let fake = FakeEbay::new();
        fake.set_shipping_services(
            "EBAY_ES",
            &[("ES_Internacional", true, true), ("ES_MRW", true, false)],
        );
        let ctx = test_context_with(fake, Settings::default());
        let report = ctx.bootstrap_marketplaces(&codes(&["EBAY_ES"])).await.unwrap();
        let es = &report.results["EBAY_ES"];
        assert_eq!(es.shipping_service, "ES_MRW");
        assert_eq!(es.shipping_service_source, ServiceSource::Live);
    }

    #[tokio::test]
    async fn unknown_ids_are_listed_not_provisioned() {
        let fake = FakeEbay::new();
        let ctx = test_context_with(fake.clone(), Settings::default());
        let report = ctx
            .bootstrap_marketplaces(&codes(&["EBAY_MARS"]))
            .await
            .unwrap();
        assert_eq!(report.unknown, vec!["EBAY_MARS"]);
        assert!(report.results.is_empty());
        assert_eq!(fake.total_calls(), 0);
    }
}
