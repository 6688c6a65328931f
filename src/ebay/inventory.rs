use crate::catalog::MarketplaceEntry;
use crate::ebay::auth::TokenScope;
use crate::ebay::client::{EbayClient, with_marketplace_headers};
use crate::ebay::error::{
    CreateOutcome, ERROR_LOCATION_EXISTS, UpstreamError, has_error_id, is_not_found,
};
use crate::http::ApiRequest;
use crate::profile::ShippingOrigin;
use serde::Serialize;
use std::collections::BTreeMap;
use urlencoding::encode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyGone,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemRequest {
    pub availability: InventoryAvailability,
    pub condition: String,
    pub product: InventoryProduct,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAvailability {
    pub ship_to_location_availability: ShipToLocationAvailability,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipToLocationAvailability {
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryProduct {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aspects: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
}

impl InventoryItemRequest {
    pub fn single_unit(condition: &str, product: InventoryProduct) -> Self {
        Self {
            availability: InventoryAvailability {
                ship_to_location_availability: ShipToLocationAvailability { quantity: 1 },
            },
            condition: condition.to_string(),
            product,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLocationRequest {
    pub merchant_location_status: &'static str,
    pub location_types: Vec<&'static str>,
    pub name: String,
    pub location: LocationDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationDetails {
    pub address: LocationAddress,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAddress {
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state_or_province: String,
    pub postal_code: String,
    pub country: String,
}

impl InventoryLocationRequest {
    pub fn warehouse(origin: &ShippingOrigin) -> Self {
        Self {
            merchant_location_status: "ENABLED",
            location_types: vec!["WAREHOUSE"],
            name: origin.name.clone(),
            location: LocationDetails {
                address: LocationAddress {
                    address_line1: origin.address_line1.clone(),
                    address_line2: origin.address_line2.clone(),
                    city: origin.city.clone(),
                    state_or_province: origin.state_or_province.clone(),
                    postal_code: origin.postal_code.clone(),
                    country: origin.country.clone(),
                },
            },
        }
    }
}

fn inventory_item_path(sku: &str) -> String {
    format!("/sell/inventory/v1/inventory_item/{}", encode(sku))
}

fn location_path(key: &str) -> String {
    format!("/sell/inventory/v1/location/{}", encode(key))
}

impl EbayClient {
    /// Create-or-replace; safe to repeat on every attempt.
    pub async fn upsert_inventory_item(
        &self,
        entry: &MarketplaceEntry,
        sku: &str,
        payload: &InventoryItemRequest,
    ) -> Result<u32, UpstreamError> {
        let body = serde_json::to_value(payload)
            .map_err(|err| UpstreamError::decode("upsert_inventory_item", err, 0))?;
        let request = with_marketplace_headers(
            ApiRequest::put(self.url(&inventory_item_path(sku))).json(body),
            entry,
        );
        let executed = self
            .send_ok("upsert_inventory_item", TokenScope::User, request)
            .await?;
        Ok(executed.attempts)
    }

    pub async fn delete_inventory_item(
        &self,
        entry: &MarketplaceEntry,
        sku: &str,
    ) -> Result<Removal, UpstreamError> {
        let request = with_marketplace_headers(
            ApiRequest::delete(self.url(&inventory_item_path(sku))),
            entry,
        );
        let executed = self
            .send("delete_inventory_item", TokenScope::User, request)
            .await?;
        if executed.response.is_success() {
            Ok(Removal::Removed)
        } else if is_not_found(&executed.response) {
            Ok(Removal::AlreadyGone)
        } else {
            Err(UpstreamError::from_response(
                "delete_inventory_item",
                &executed,
            ))
        }
    }

    pub async fn location_exists(&self, key: &str) -> Result<bool, UpstreamError> {
        let request = ApiRequest::get(self.url(&location_path(key)));
        let executed = self.send("get_location", TokenScope::User, request).await?;
        if executed.response.is_success() {
            Ok(true)
        } else if is_not_found(&executed.response) {
            Ok(false)
        } else {
            Err(UpstreamError::from_response("get_location", &executed))
        }
    }

    /// Creates the merchant location unless eBay already has it.
    pub async fn ensure_location(&self, key: &str, origin: &ShippingOrigin) -> CreateOutcome {
        match self.location_exists(key).await {
            Ok(true) => return CreateOutcome::AlreadyExists(Some(key.to_string())),
            Ok(false) => {}
            Err(err) => return CreateOutcome::Failed(err),
        }
        let body = match serde_json::to_value(InventoryLocationRequest::warehouse(origin)) {
            Ok(body) => body,
            Err(err) => return CreateOutcome::Failed(UpstreamError::decode("create_location", err, 0)),
        };
        let request = ApiRequest::post(self.url(&location_path(key))).json(body);
        let executed = match self.send("create_location", TokenScope::User, request).await {
            Ok(executed) => executed,
            Err(err) => return CreateOutcome::Failed(err),
        };
        let response = &executed.response;
        if response.is_success() {
            CreateOutcome::Created(key.to_string())
        } else if response.status == 409 || has_error_id(response, ERROR_LOCATION_EXISTS) {
            CreateOutcome::AlreadyExists(Some(key.to_string()))
        } else {
            CreateOutcome::Failed(UpstreamError::from_response("create_location", &executed))
        }
    }
}
