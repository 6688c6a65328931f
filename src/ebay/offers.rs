use crate::catalog::MarketplaceEntry;
use crate::ebay::auth::TokenScope;
use crate::ebay::client::{EbayClient, with_marketplace_headers};
use crate::ebay::error::{
    CreateOutcome, ERROR_OFFER_EXISTS, UpstreamClass, UpstreamError, is_not_found, parse_errors,
};
use crate::ebay::inventory::Removal;
use crate::http::ApiRequest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

impl Amount {
    pub fn new(amount: f64, currency: &str) -> Self {
        Self {
            value: format!("{amount:.2}"),
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingSummary {
    pub price: Amount,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPolicies {
    pub fulfillment_policy_id: String,
    pub payment_policy_id: String,
    pub return_policy_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shipping_cost_overrides: Vec<ShippingCostOverride>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingCostOverride {
    pub priority: u8,
    pub shipping_service_type: &'static str,
    pub shipping_cost: Amount,
}

/// Full offer body; eBay's update is a replace, so create and update share it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub sku: String,
    pub marketplace_id: String,
    pub format: &'static str,
    pub category_id: String,
    pub listing_description: String,
    pub pricing_summary: PricingSummary,
    pub available_quantity: i32,
    pub merchant_location_key: String,
    pub listing_policies: ListingPolicies,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OfferListing {
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub listing_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSummary {
    pub offer_id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub marketplace_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub listing: Option<OfferListing>,
}

impl OfferSummary {
    pub fn listing_id(&self) -> Option<&str> {
        self.listing
            .as_ref()
            .and_then(|listing| listing.listing_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn is_published(&self) -> bool {
        self.status.as_deref() == Some("PUBLISHED") || self.listing_id().is_some()
    }
}

#[derive(Debug, Deserialize, Default)]
struct OfferSearchResponse {
    #[serde(default)]
    offers: Vec<OfferSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedOffer {
    pub listing_id: String,
    pub attempts: u32,
}

fn offer_path(offer_id: &str) -> String {
    format!("/sell/inventory/v1/offer/{}", urlencoding::encode(offer_id))
}

impl EbayClient {
    /// Offers for `sku` on one marketplace. An unknown SKU is an empty list.
    pub async fn list_offers(
        &self,
        entry: &MarketplaceEntry,
        sku: &str,
    ) -> Result<Vec<OfferSummary>, UpstreamError> {
        let request = with_marketplace_headers(
            ApiRequest::get(self.url("/sell/inventory/v1/offer"))
                .query("sku", sku)
                .query("marketplace_id", entry.id.ebay_code()),
            entry,
        );
        let executed = self.send("list_offers", TokenScope::User, request).await?;
        if is_not_found(&executed.response) {
            return Ok(Vec::new());
        }
        if !executed.response.is_success() {
            return Err(UpstreamError::from_response("list_offers", &executed));
        }
        let payload: OfferSearchResponse = executed
            .response
            .json()
            .map_err(|err| UpstreamError::decode("list_offers", err, executed.attempts))?;
        Ok(payload
            .offers
            .into_iter()
            .filter(|offer| {
                offer
                    .marketplace_id
                    .as_deref()
                    .is_none_or(|id| id.eq_ignore_ascii_case(entry.id.ebay_code()))
            })
            .collect())
    }

    pub async fn get_offer(
        &self,
        entry: &MarketplaceEntry,
        offer_id: &str,
    ) -> Result<OfferSummary, UpstreamError> {
        let request =
            with_marketplace_headers(ApiRequest::get(self.url(&offer_path(offer_id))), entry);
        self.send_json("get_offer", TokenScope::User, request).await
    }

    pub async fn create_offer(
        &self,
        entry: &MarketplaceEntry,
        payload: &OfferRequest,
    ) -> CreateOutcome {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(err) => return CreateOutcome::Failed(UpstreamError::decode("create_offer", err, 0)),
        };
        let request = with_marketplace_headers(
            ApiRequest::post(self.url("/sell/inventory/v1/offer")).json(body),
            entry,
        );
        let executed = match self.send("create_offer", TokenScope::User, request).await {
            Ok(executed) => executed,
            Err(err) => return CreateOutcome::Failed(err),
        };
        let response = &executed.response;
        if response.is_success() {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct Created {
                offer_id: String,
            }
            return match response.json::<Created>() {
                Ok(created) => CreateOutcome::Created(created.offer_id),
                Err(err) => CreateOutcome::Failed(UpstreamError::decode(
                    "create_offer",
                    err,
                    executed.attempts,
                )),
            };
        }
        let existing = parse_errors(response)
            .into_iter()
            .find(|detail| detail.error_id == Some(ERROR_OFFER_EXISTS));
        match existing {
            Some(detail) => {
                CreateOutcome::AlreadyExists(detail.parameter("offerId").map(str::to_string))
            }
            None if response.status == 409 => CreateOutcome::AlreadyExists(None),
            None => CreateOutcome::Failed(UpstreamError::from_response("create_offer", &executed)),
        }
    }

    pub async fn update_offer(
        &self,
        entry: &MarketplaceEntry,
        offer_id: &str,
        payload: &OfferRequest,
    ) -> Result<(), UpstreamError> {
        let body = serde_json::to_value(payload)
            .map_err(|err| UpstreamError::decode("update_offer", err, 0))?;
        let request = with_marketplace_headers(
            ApiRequest::put(self.url(&offer_path(offer_id))).json(body),
            entry,
        );
        self.send_ok("update_offer", TokenScope::User, request)
            .await
            .map(|_| ())
    }

    pub async fn delete_offer(
        &self,
        entry: &MarketplaceEntry,
        offer_id: &str,
    ) -> Result<Removal, UpstreamError> {
        let request =
            with_marketplace_headers(ApiRequest::delete(self.url(&offer_path(offer_id))), entry);
        self.removal("delete_offer", request).await
    }

    /// Ends the live listing but keeps the offer.
    pub async fn withdraw_offer(
        &self,
        entry: &MarketplaceEntry,
        offer_id: &str,
    ) -> Result<Removal, UpstreamError> {
        let path = format!("{}/withdraw", offer_path(offer_id));
        let request = with_marketplace_headers(ApiRequest::post(self.url(&path)), entry);
        self.removal("withdraw_offer", request).await
    }

    pub async fn publish_offer(
        &self,
        entry: &MarketplaceEntry,
        offer_id: &str,
    ) -> Result<PublishedOffer, UpstreamError> {
        let path = format!("{}/publish", offer_path(offer_id));
        let request = with_marketplace_headers(ApiRequest::post(self.url(&path)), entry);
        let executed = self
            .send_ok("publish_offer", TokenScope::User, request)
            .await?;

        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase")]
        struct PublishResponse {
            #[serde(default)]
            listing_id: Option<String>,
        }
        let listing_id = executed
            .response
            .json::<PublishResponse>()
            .ok()
            .and_then(|payload| payload.listing_id)
            .filter(|id| !id.is_empty());
        let listing_id = match listing_id {
            Some(id) => id,
            // 204 responses carry no body; the offer knows its listing.
            None => self
                .get_offer(entry, offer_id)
                .await?
                .listing_id()
                .map(str::to_string)
                .ok_or_else(|| UpstreamError {
                    operation: "publish_offer",
                    class: UpstreamClass::Permanent,
                    status: Some(executed.response.status),
                    message: "published offer has no listing id".to_string(),
                    attempts: executed.attempts,
                })?,
        };
        Ok(PublishedOffer {
            listing_id,
            attempts: executed.attempts,
        })
    }

    async fn removal(
        &self,
        operation: &'static str,
        request: ApiRequest,
    ) -> Result<Removal, UpstreamError> {
        let executed = self.send(operation, TokenScope::User, request).await?;
        if executed.response.is_success() {
            Ok(Removal::Removed)
        } else if is_not_found(&executed.response) {
            Ok(Removal::AlreadyGone)
        } else {
            Err(UpstreamError::from_response(operation, &executed))
        }
    }
}
