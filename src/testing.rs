use crate::app::{AppContext, Backends, Caches};
use crate::catalog::MarketplaceId;
use crate::clock::{Clock, ManualClock};
use crate::config::AppConfig;
use crate::ebay::StaticTokenProvider;
use crate::http::{ApiRequest, ApiResponse, HttpMethod, RequestBody, Transport, TransportError};
use crate::models::{Draft, DraftStatus};
use crate::profile::{MarketplaceSettings, PolicyOverride, Settings};
use crate::store::MemoryStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub const FX_FEED_URL: &str = "https://fx.test/eurofxref-daily.xml";
pub const PUBLIC_BASE_URL: &str = "https://shop.example.com";

const ECB_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01" xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
  <Cube>
    <Cube time="2026-10-16">
      <Cube currency="USD" rate="1.10"/>
      <Cube currency="GBP" rate="0.86"/>
      <Cube currency="AUD" rate="1.70"/>
    </Cube>
  </Cube>
</gesmes:Envelope>"#;

#[derive(Debug, Clone)]
pub struct FakeOffer {
    pub offer_id: String,
    pub sku: String,
    pub marketplace_id: String,
    pub category_id: String,
    pub price: String,
    pub listing_id: Option<String>,
    pub updates: usize,
}

impl FakeOffer {
    fn to_json(&self) -> Value {
        let mut offer = json!({
            "offerId": self.offer_id,
            "sku": self.sku,
            "marketplaceId": self.marketplace_id,
            "status": if self.listing_id.is_some() { "PUBLISHED" } else { "UNPUBLISHED" },
        });
        if let Some(listing_id) = &self.listing_id {
            offer["listing"] = json!({"listingId": listing_id, "listingStatus": "ACTIVE"});
        }
        offer
    }
}

#[derive(Debug, Clone)]
pub struct FakeInventoryItem {
    pub content_language: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct FakePolicy {
    kind: String,
    marketplace_id: String,
    id: String,
    name: String,
}

#[derive(Default)]
struct State {
    calls: Vec<ApiRequest>,
    next_id: u32,
    inventory: BTreeMap<String, FakeInventoryItem>,
    locations: BTreeSet<String>,
    offers: Vec<FakeOffer>,
    policies: Vec<FakePolicy>,
    shipping_services: HashMap<String, Vec<Value>>,
    suggestions: HashMap<String, String>,
    aspects: HashMap<String, Vec<(String, bool)>>,
    taxonomy_failure: Option<u16>,
    publish_failures: HashMap<String, (u16, Value)>,
    /// Offer list lookups that still answer "not found" regardless of state.
    hidden_offer_lists: u32,
    /// Duplicate creates answer a bare 409 instead of error 25002.
    bare_create_conflicts: bool,
    offer_delete_failure: Option<u16>,
    withdraw_failure: Option<u16>,
}

/// Fake marketplace behind the [`Transport`] seam. Every request is recorded.
#[derive(Default)]
pub struct FakeEbay {
    state: Mutex<State>,
}

fn error_response(status: u16, error_id: i64) -> ApiResponse {
    ApiResponse::new(status, json!({"errors": [{"errorId": error_id}]}).to_string())
}

fn json_response(status: u16, body: Value) -> ApiResponse {
    ApiResponse::new(status, body.to_string())
}

fn query_value<'a>(request: &'a ApiRequest, key: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn body_of(request: &ApiRequest) -> Value {
    match &request.body {
        RequestBody::Json(value) => value.clone(),
        _ => Value::Null,
    }
}

impl FakeEbay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn suggest_category(&self, query: &str, category_id: &str) {
        self.state
            .lock()
            .suggestions
            .insert(query.to_string(), category_id.to_string());
    }

    pub fn fail_taxonomy(&self, status: u16) {
        self.state.lock().taxonomy_failure = Some(status);
    }

    pub fn set_aspects(&self, category_id: &str, aspects: &[(&str, bool)]) {
        self.state.lock().aspects.insert(
            category_id.to_string(),
            aspects
                .iter()
                .map(|(name, required)| (name.to_string(), *required))
                .collect(),
        );
    }

    /// Every publish for offers on `marketplace_id` answers with `status`.
    pub fn fail_publish(&self, marketplace_id: &str, status: u16) {
        self.fail_publish_with(
            marketplace_id,
            status,
            json!({"errors": [{"errorId": 25001, "message": "System error"}]}),
        );
    }

    pub fn fail_publish_with(&self, marketplace_id: &str, status: u16, body: Value) {
        self.state
            .lock()
            .publish_failures
            .insert(marketplace_id.to_string(), (status, body));
    }

    /// The next `count` offer list lookups miss, as when a listing index lags
    /// behind a concurrent create.
    pub fn hide_offer_lists(&self, count: u32) {
        self.state.lock().hidden_offer_lists = count;
    }

    pub fn bare_create_conflicts(&self) {
        self.state.lock().bare_create_conflicts = true;
    }

    pub fn fail_offer_deletes(&self, status: u16) {
        self.state.lock().offer_delete_failure = Some(status);
    }

    pub fn fail_withdraws(&self, status: u16) {
        self.state.lock().withdraw_failure = Some(status);
    }

    pub fn set_shipping_services(&self, marketplace_id: &str, services: &[(&str, bool, bool)]) {
        self.state.lock().shipping_services.insert(
            marketplace_id.to_string(),
            services
                .iter()
                .map(|(code, valid, international)| {
                    json!({
                        "shippingServiceCode": code,
                        "validForSellingFlow": valid,
                        "internationalService": international,
                    })
                })
                .collect(),
        );
    }

    /// Puts an offer in place as if an earlier run had created it.
    pub fn seed_offer(&self, sku: &str, marketplace_id: &str, listing_id: Option<&str>) -> String {
        let mut state = self.state.lock();
        let offer_id = state.next_id("offer");
        state.inventory.insert(
            sku.to_string(),
            FakeInventoryItem {
                content_language: None,
                body: Value::Null,
            },
        );
        state.offers.push(FakeOffer {
            offer_id: offer_id.clone(),
            sku: sku.to_string(),
            marketplace_id: marketplace_id.to_string(),
            category_id: String::new(),
            price: String::new(),
            listing_id: listing_id.map(str::to_string),
            updates: 0,
        });
        offer_id
    }

    pub fn seed_policy(&self, kind: &str, marketplace_id: &str, name: &str) -> String {
        let mut state = self.state.lock();
        let id = state.next_id(kind);
        state.policies.push(FakePolicy {
            kind: kind.to_string(),
            marketplace_id: marketplace_id.to_string(),
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn seed_location(&self, key: &str) {
        self.state.lock().locations.insert(key.to_string());
    }

    /// Drops offers and inventory for `sku` behind the orchestrator's back.
    pub fn delete_out_of_band(&self, sku: &str) {
        let mut state = self.state.lock();
        state.offers.retain(|offer| offer.sku != sku);
        state.inventory.remove(sku);
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Requests whose URL path contains `fragment`.
    pub fn calls_matching(&self, fragment: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.url.contains(fragment))
            .count()
    }

    pub fn offer_count(&self) -> usize {
        self.state.lock().offers.len()
    }

    pub fn offers_for(&self, sku: &str) -> Vec<FakeOffer> {
        self.state
            .lock()
            .offers
            .iter()
            .filter(|offer| offer.sku == sku)
            .cloned()
            .collect()
    }

    pub fn offer_category(&self, sku: &str) -> Option<String> {
        self.offers_for(sku).first().map(|o| o.category_id.clone())
    }

    pub fn offer_price(&self, sku: &str) -> Option<String> {
        self.offers_for(sku).first().map(|o| o.price.clone())
    }

    pub fn offer_updates(&self, offer_id: &str) -> usize {
        self.state
            .lock()
            .offers
            .iter()
            .find(|offer| offer.offer_id == offer_id)
            .map(|offer| offer.updates)
            .unwrap_or(0)
    }

    pub fn inventory_skus(&self) -> Vec<String> {
        self.state.lock().inventory.keys().cloned().collect()
    }

    pub fn inventory_item(&self, sku: &str) -> Option<FakeInventoryItem> {
        self.state.lock().inventory.get(sku).cloned()
    }

    pub fn location_count(&self) -> usize {
        self.state.lock().locations.len()
    }

    pub fn policy_count(&self) -> usize {
        self.state.lock().policies.len()
    }
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn offer_mut(&mut self, offer_id: &str) -> Option<&mut FakeOffer> {
        self.offers.iter_mut().find(|offer| offer.offer_id == offer_id)
    }

    fn route(&mut self, request: &ApiRequest, path: &[&str]) -> ApiResponse {
        use HttpMethod::*;
        match (request.method, path) {
            (Get, ["eurofxref-daily.xml"]) => ApiResponse::new(200, ECB_XML),

            (Put, ["sell", "inventory", "v1", "inventory_item", sku]) => {
                self.inventory.insert(
                    sku.to_string(),
                    FakeInventoryItem {
                        content_language: request.header_value("Content-Language").map(str::to_string),
                        body: body_of(request),
                    },
                );
                ApiResponse::new(204, "")
            }
            (Delete, ["sell", "inventory", "v1", "inventory_item", sku]) => {
                match self.inventory.remove(*sku) {
                    Some(_) => ApiResponse::new(204, ""),
                    None => error_response(404, 25710),
                }
            }

            (Get, ["sell", "inventory", "v1", "location", key]) => {
                if self.locations.contains(*key) {
                    json_response(200, json!({"merchantLocationKey": key}))
                } else {
                    error_response(404, 25805)
                }
            }
            (Post, ["sell", "inventory", "v1", "location", key]) => {
                if self.locations.insert(key.to_string()) {
                    ApiResponse::new(204, "")
                } else {
                    error_response(409, 25803)
                }
            }

            (Get, ["sell", "inventory", "v1", "offer"]) => {
                if self.hidden_offer_lists > 0 {
                    self.hidden_offer_lists -= 1;
                    return error_response(404, 25713);
                }
                let sku = query_value(request, "sku").unwrap_or_default();
                let marketplace = query_value(request, "marketplace_id");
                let offers: Vec<Value> = self
                    .offers
                    .iter()
                    .filter(|offer| offer.sku == sku)
                    .filter(|offer| marketplace.is_none_or(|m| m == offer.marketplace_id))
                    .map(FakeOffer::to_json)
                    .collect();
                if offers.is_empty() {
                    error_response(404, 25713)
                } else {
                    json_response(200, json!({"offers": offers, "total": offers.len()}))
                }
            }
            (Post, ["sell", "inventory", "v1", "offer"]) => {
                let body = body_of(request);
                let sku = body["sku"].as_str().unwrap_or_default().to_string();
                let marketplace = body["marketplaceId"].as_str().unwrap_or_default().to_string();
                if let Some(existing) = self
                    .offers
                    .iter()
                    .find(|offer| offer.sku == sku && offer.marketplace_id == marketplace)
                {
                    if self.bare_create_conflicts {
                        return ApiResponse::new(409, "conflict");
                    }
                    return json_response(
                        400,
                        json!({"errors": [{
                            "errorId": 25002,
                            "message": "Offer entity already exists.",
                            "parameters": [{"name": "offerId", "value": existing.offer_id}],
                        }]}),
                    );
                }
                let offer_id = self.next_id("offer");
                self.offers.push(FakeOffer {
                    offer_id: offer_id.clone(),
                    sku,
                    marketplace_id: marketplace,
                    category_id: body["categoryId"].as_str().unwrap_or_default().to_string(),
                    price: body["pricingSummary"]["price"]["value"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    listing_id: None,
                    updates: 0,
                });
                json_response(201, json!({"offerId": offer_id}))
            }
            (Get, ["sell", "inventory", "v1", "offer", offer_id]) => match self.offer_mut(offer_id) {
                Some(offer) => json_response(200, offer.to_json()),
                None => error_response(404, 25713),
            },
            (Put, ["sell", "inventory", "v1", "offer", offer_id]) => {
                let body = body_of(request);
                match self.offer_mut(offer_id) {
                    Some(offer) => {
                        offer.updates += 1;
                        offer.category_id =
                            body["categoryId"].as_str().unwrap_or_default().to_string();
                        offer.price = body["pricingSummary"]["price"]["value"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string();
                        ApiResponse::new(204, "")
                    }
                    None => error_response(404, 25713),
                }
            }
            (Delete, ["sell", "inventory", "v1", "offer", offer_id]) => {
                if let Some(status) = self.offer_delete_failure {
                    return ApiResponse::new(status, "offer is locked");
                }
                let before = self.offers.len();
                self.offers.retain(|offer| offer.offer_id != *offer_id);
                if self.offers.len() < before {
                    ApiResponse::new(204, "")
                } else {
                    error_response(404, 25713)
                }
            }
            (Post, ["sell", "inventory", "v1", "offer", offer_id, "publish"]) => {
                let failure = self
                    .offers
                    .iter()
                    .find(|offer| offer.offer_id == *offer_id)
                    .and_then(|offer| self.publish_failures.get(&offer.marketplace_id).cloned());
                if let Some((status, body)) = failure {
                    return json_response(status, body);
                }
                let fresh = self.next_id("listing");
                match self.offer_mut(offer_id) {
                    Some(offer) => {
                        let listing_id = offer.listing_id.get_or_insert(fresh).clone();
                        json_response(200, json!({"listingId": listing_id}))
                    }
                    None => error_response(404, 25713),
                }
            }
            (Post, ["sell", "inventory", "v1", "offer", offer_id, "withdraw"]) => {
                if let Some(status) = self.withdraw_failure {
                    return ApiResponse::new(status, "withdraw rejected");
                }
                match self.offer_mut(offer_id) {
                    Some(offer) => {
                        let listing_id = offer.listing_id.take();
                        json_response(200, json!({"listingId": listing_id}))
                    }
                    None => error_response(404, 25713),
                }
            }

            (Get, ["commerce", "taxonomy", "v1", "category_tree", _, "get_category_suggestions"]) => {
                if let Some(status) = self.taxonomy_failure {
                    return ApiResponse::new(status, "taxonomy unavailable");
                }
                let query = query_value(request, "q").unwrap_or_default();
                let suggestions: Vec<Value> = self
                    .suggestions
                    .get(query)
                    .map(|id| vec![json!({"category": {"categoryId": id, "categoryName": query}})])
                    .unwrap_or_default();
                json_response(200, json!({"categorySuggestions": suggestions}))
            }
            (Get, ["commerce", "taxonomy", "v1", "category_tree", _, "get_item_aspects_for_category"]) => {
                if let Some(status) = self.taxonomy_failure {
                    return ApiResponse::new(status, "taxonomy unavailable");
                }
                let category = query_value(request, "category_id").unwrap_or_default();
                let aspects: Vec<Value> = self
                    .aspects
                    .get(category)
                    .map(|list| {
                        list.iter()
                            .map(|(name, required)| {
                                json!({
                                    "localizedAspectName": name,
                                    "aspectConstraint": {"aspectRequired": required},
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                json_response(200, json!({"aspects": aspects}))
            }

            (Get, ["sell", "metadata", "v1", "shipping", "marketplace", marketplace, "get_shipping_services"]) => {
                let services = self.shipping_services.get(*marketplace).cloned().unwrap_or_default();
                json_response(200, json!({"shippingServices": services}))
            }

            (Get, ["sell", "account", "v1", resource]) => {
                let Some(kind) = resource.strip_suffix("_policy") else {
                    return ApiResponse::new(404, "");
                };
                let marketplace = query_value(request, "marketplace_id").unwrap_or_default();
                let list: Vec<Value> = self
                    .policies
                    .iter()
                    .filter(|p| p.kind == kind && p.marketplace_id == marketplace)
                    .map(|p| json!({format!("{kind}PolicyId"): p.id, "name": p.name}))
                    .collect();
                json_response(200, json!({format!("{kind}Policies"): list}))
            }
            (Post, ["sell", "account", "v1", resource]) => {
                let Some(kind) = resource.strip_suffix("_policy") else {
                    return ApiResponse::new(404, "");
                };
                let body = body_of(request);
                let name = body["name"].as_str().unwrap_or_default().to_string();
                let marketplace = body["marketplaceId"].as_str().unwrap_or_default().to_string();
                if let Some(existing) = self
                    .policies
                    .iter()
                    .find(|p| p.kind == kind && p.marketplace_id == marketplace && p.name == name)
                {
                    return json_response(
                        400,
                        json!({"errors": [{
                            "errorId": 20400,
                            "parameters": [{"name": "DuplicateProfileId", "value": existing.id}],
                        }]}),
                    );
                }
                let id = self.next_id(kind);
                self.policies.push(FakePolicy {
                    kind: kind.to_string(),
                    marketplace_id: marketplace,
                    id: id.clone(),
                    name,
                });
                json_response(201, json!({format!("{kind}PolicyId"): id}))
            }

            _ => ApiResponse::new(404, "no route"),
        }
    }
}

#[async_trait]
impl Transport for FakeEbay {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let segments: Vec<String> = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        urlencoding::decode(s)
                            .map(|decoded| decoded.into_owned())
                            .unwrap_or_else(|_| s.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();
        let path: Vec<&str> = segments.iter().map(String::as_str).collect();

        let mut state = self.state.lock();
        state.calls.push(request.clone());
        Ok(state.route(request, &path))
    }
}

/// Policies and a location for every catalog marketplace.
pub fn ready_settings() -> Settings {
    let mut settings = Settings::default();
    for id in MarketplaceId::ALL {
        let entry = id.entry();
        let cc = entry.country_code.to_lowercase();
        settings.marketplaces.insert(
            id.ebay_code().to_string(),
            MarketplaceSettings {
                policies: Some(PolicyOverride {
                    fulfillment: Some(format!("f-{cc}")),
                    payment: Some(format!("p-{cc}")),
                    return_policy: Some(format!("r-{cc}")),
                }),
                merchant_location_key: Some(entry.default_location_key.to_string()),
                ..Default::default()
            },
        );
    }
    settings
}

pub fn sample_draft(id: &str) -> Draft {
    let mut draft = Draft::new(id, "WHL-001");
    draft.item_type = Some("WHL".to_string());
    draft.title = "Spitfire Formula Four 54mm wheels".to_string();
    draft.description = "Lightly used, no flat spots.".to_string();
    draft
        .aspects
        .insert("Brand".to_string(), "Spitfire".to_string());
    draft.image_urls = vec!["wheels-1.jpg".to_string()];
    draft.status = DraftStatus::Ready;
    draft
}

pub fn test_config() -> AppConfig {
    AppConfig {
        fx_feed_url: FX_FEED_URL.to_string(),
        public_base_url: Some(PUBLIC_BASE_URL.to_string()),
        ..AppConfig::default()
    }
}

pub fn test_context(fake: Arc<FakeEbay>) -> AppContext {
    test_context_with(fake, ready_settings())
}

pub fn test_context_with(fake: Arc<FakeEbay>, settings: Settings) -> AppContext {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
    ));
    let store = Arc::new(MemoryStore::with_settings(settings));
    AppContext::new(
        test_config(),
        Backends {
            transport: fake,
            caches: Caches::in_memory(clock.clone()),
            clock,
            tokens: Arc::new(StaticTokenProvider::new("test-token")),
            drafts: store.clone(),
            settings: store,
        },
    )
}
