use crate::catalog::{MarketplaceEntry, MarketplaceId};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub marketplaces: BTreeMap<String, MarketplaceSettings>,
    #[serde(default)]
    pub shipping_origin: ShippingOrigin,
}

impl Settings {
    /// Looks up the override block for a marketplace, accepting code aliases
    /// (`EBAY_UK` for `EBAY_GB`) and any casing used as the document key.
    pub fn for_marketplace(&self, id: MarketplaceId) -> Option<&MarketplaceSettings> {
        self.marketplaces.get(id.ebay_code()).or_else(|| {
            self.marketplaces
                .iter()
                .find(|(key, _)| key.parse::<MarketplaceId>().ok() == Some(id))
                .map(|(_, value)| value)
        })
    }

    pub fn marketplace_mut(&mut self, id: MarketplaceId) -> &mut MarketplaceSettings {
        let key = self
            .marketplaces
            .keys()
            .find(|key| key.parse::<MarketplaceId>().ok() == Some(id))
            .cloned()
            .unwrap_or_else(|| id.ebay_code().to_string());
        self.marketplaces.entry(key).or_default()
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketplaceSettings {
    pub policies: Option<PolicyOverride>,
    // Flat policy fields written by older settings screens.
    pub fulfillment_policy_id: Option<String>,
    pub payment_policy_id: Option<String>,
    pub return_policy_id: Option<String>,
    pub merchant_location_key: Option<String>,
    pub shipping_service_code: Option<String>,
    pub price: Option<f64>,
    pub shipping_cost: Option<f64>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyOverride {
    pub fulfillment: Option<String>,
    pub payment: Option<String>,
    #[serde(rename = "return")]
    pub return_policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShippingOrigin {
    pub name: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub state_or_province: String,
    pub postal_code: String,
    pub country: String,
}

impl Default for ShippingOrigin {
    fn default() -> Self {
        Self {
            name: "Milan warehouse".to_string(),
            address_line1: "Via Torino 1".to_string(),
            address_line2: None,
            city: "Milano".to_string(),
            state_or_province: "MI".to_string(),
            postal_code: "20123".to_string(),
            country: "IT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyIds {
    pub fulfillment: Option<String>,
    pub payment: Option<String>,
    #[serde(rename = "return")]
    pub return_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub marketplace: MarketplaceId,
    pub entry: &'static MarketplaceEntry,
    pub policies: PolicyIds,
    pub merchant_location_key: Option<String>,
    pub shipping_service_code: String,
    /// Operator price for this storefront, when one is configured.
    pub price: Option<f64>,
    pub shipping_cost: f64,
}

impl Profile {
    pub fn from_entry(entry: &'static MarketplaceEntry) -> Self {
        Self {
            marketplace: entry.id,
            entry,
            policies: PolicyIds::default(),
            merchant_location_key: None,
            shipping_service_code: entry.fallback_shipping_service.to_string(),
            price: None,
            shipping_cost: entry.default_shipping_cost,
        }
    }

    pub fn currency(&self) -> &'static str {
        self.entry.currency
    }

    pub fn locale(&self) -> &'static str {
        self.entry.locale
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingField {
    pub marketplace: MarketplaceId,
    pub field: &'static str,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}", self.field, self.marketplace)
    }
}

/// Returns `None` for marketplace ids outside the catalog.
pub fn resolve(marketplace_id: &str, settings: &Settings) -> Option<Profile> {
    let id = marketplace_id.parse::<MarketplaceId>().ok()?;
    let mut profile = Profile::from_entry(id.entry());
    if let Some(overrides) = settings.for_marketplace(id) {
        apply_overrides(&mut profile, overrides);
    }
    Some(profile)
}

fn apply_overrides(profile: &mut Profile, overrides: &MarketplaceSettings) {
    let nested = overrides.policies.as_ref();
    merge_field(
        &mut profile.policies.fulfillment,
        nested.and_then(|p| p.fulfillment.as_deref()),
        overrides.fulfillment_policy_id.as_deref(),
    );
    merge_field(
        &mut profile.policies.payment,
        nested.and_then(|p| p.payment.as_deref()),
        overrides.payment_policy_id.as_deref(),
    );
    merge_field(
        &mut profile.policies.return_policy,
        nested.and_then(|p| p.return_policy.as_deref()),
        overrides.return_policy_id.as_deref(),
    );

    if let Some(key) = non_empty(overrides.merchant_location_key.as_deref()) {
        profile.merchant_location_key = Some(key.to_string());
    }
    if let Some(code) = non_empty(overrides.shipping_service_code.as_deref()) {
        profile.shipping_service_code = code.to_string();
    }
    if let Some(price) = overrides.price.filter(|p| p.is_finite() && *p > 0.0) {
        profile.price = Some(price);
    }
    if let Some(cost) = overrides.shipping_cost.filter(|c| c.is_finite() && *c >= 0.0) {
        profile.shipping_cost = cost;
    }
}

/// Nested block wins, then the legacy flat field, then whatever was there.
fn merge_field(target: &mut Option<String>, nested: Option<&str>, legacy: Option<&str>) {
    if let Some(value) = non_empty(nested).or_else(|| non_empty(legacy)) {
        *target = Some(value.to_string());
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Empty result means the profile is publish-ready.
pub fn validate_for_publish(profile: &Profile) -> Vec<MissingField> {
    let checks: [(&'static str, Option<&str>); 4] = [
        ("fulfillment_policy_id", profile.policies.fulfillment.as_deref()),
        ("payment_policy_id", profile.policies.payment.as_deref()),
        ("return_policy_id", profile.policies.return_policy.as_deref()),
        (
            "merchant_location_key",
            profile.merchant_location_key.as_deref(),
        ),
    ];
    checks
        .into_iter()
        .filter(|(_, value)| non_empty(*value).is_none())
        .map(|(field, _)| MissingField {
            marketplace: profile.marketplace,
            field,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_settings() -> MarketplaceSettings {
        MarketplaceSettings {
            policies: Some(PolicyOverride {
                fulfillment: Some("f-1".into()),
                payment: Some("p-1".into()),
                return_policy: Some("r-1".into()),
            }),
            merchant_location_key: Some("location_de".into()),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_marketplace_resolves_to_none() {
        assert!(resolve("EBAY_XX", &Settings::default()).is_none());
    }

    #[test]
    fn static_defaults_without_settings() {
        let profile = resolve("EBAY_DE", &Settings::default()).unwrap();
        assert_eq!(profile.currency(), "EUR");
        assert_eq!(profile.locale(), "de-DE");
        assert_eq!(profile.shipping_service_code, "DE_DHLPaket");
        assert_eq!(profile.shipping_cost, 12.0);
        assert!(profile.price.is_none());
        assert_eq!(validate_for_publish(&profile).len(), 4);
    }

    #[test]
    fn nested_policies_override_defaults() {
        let mut settings = Settings::default();
        settings
            .marketplaces
            .insert("EBAY_DE".into(), complete_settings());
        let profile = resolve("EBAY_DE", &settings).unwrap();
        assert_eq!(profile.policies.fulfillment.as_deref(), Some("f-1"));
        assert!(validate_for_publish(&profile).is_empty());
    }

    #[test]
    fn legacy_flat_fields_are_accepted_and_nested_wins() {
        let mut settings = Settings::default();
        settings.marketplaces.insert(
            "EBAY_US".into(),
            MarketplaceSettings {
                policies: Some(PolicyOverride {
                    fulfillment: Some("nested-f".into()),
                    payment: Some("  ".into()),
                    return_policy: None,
                }),
                fulfillment_policy_id: Some("flat-f".into()),
                payment_policy_id: Some("flat-p".into()),
                return_policy_id: Some("flat-r".into()),
                merchant_location_key: Some("location_us".into()),
                ..Default::default()
            },
        );
        let profile = resolve("EBAY_US", &settings).unwrap();
        assert_eq!(profile.policies.fulfillment.as_deref(), Some("nested-f"));
        assert_eq!(profile.policies.payment.as_deref(), Some("flat-p"));
        assert_eq!(profile.policies.return_policy.as_deref(), Some("flat-r"));
    }

    #[test]
    fn missing_return_policy_is_reported() {
        let mut overrides = complete_settings();
        overrides.policies.as_mut().unwrap().return_policy = None;
        let mut settings = Settings::default();
        settings.marketplaces.insert("EBAY_DE".into(), overrides);
        let profile = resolve("EBAY_DE", &settings).unwrap();
        let missing = validate_for_publish(&profile);
        assert_eq!(
            missing,
            vec![MissingField {
                marketplace: MarketplaceId::EbayDe,
                field: "return_policy_id",
            }]
        );
        assert_eq!(missing[0].to_string(), "return_policy_id for EBAY_DE");
    }

    #[test]
    fn price_and_shipping_only_replace_with_usable_values() {
        let mut settings = Settings::default();
        settings.marketplaces.insert(
            "ebay_uk".into(),
            MarketplaceSettings {
                price: Some(0.0),
                shipping_cost: Some(0.0),
                shipping_service_code: Some("UK_OtherCourier".into()),
                ..Default::default()
            },
        );
        let profile = resolve("EBAY_GB", &settings).unwrap();
        assert!(profile.price.is_none());
        assert_eq!(profile.shipping_cost, 0.0);
        assert_eq!(profile.shipping_service_code, "UK_OtherCourier");
    }

    #[test]
    fn settings_document_parses_both_shapes() {
        let raw = serde_json::json!({
            "marketplaces": {
                "EBAY_AU": {
                    "policies": {"fulfillment": "f", "payment": "p", "return": "r"},
                    "merchant_location_key": "location_au",
                    "price": 99.0
                },
                "EBAY_ES": {
                    "fulfillment_policy_id": "f",
                    "payment_policy_id": "p",
                    "return_policy_id": "r",
                    "merchant_location_key": "location_es"
                }
            }
        });
        let settings: Settings = serde_json::from_value(raw).unwrap();
        for code in ["EBAY_AU", "EBAY_ES"] {
            let profile = resolve(code, &settings).unwrap();
            assert!(validate_for_publish(&profile).is_empty(), "{code}");
        }
        assert_eq!(settings.shipping_origin.country, "IT");
    }
}
