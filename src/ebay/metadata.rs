use crate::catalog::MarketplaceEntry;
use crate::ebay::auth::TokenScope;
use crate::ebay::client::EbayClient;
use crate::ebay::error::UpstreamError;
use crate::http::ApiRequest;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ShippingServicesResponse {
    #[serde(default)]
    shipping_services: Vec<ShippingService>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingService {
    pub shipping_service_code: String,
    #[serde(default)]
    pub valid_for_selling_flow: Option<bool>,
    #[serde(default)]
    pub international_service: Option<bool>,
}

impl ShippingService {
    /// Domestic services eBay accepts for new listings.
    pub fn is_usable(&self) -> bool {
        self.valid_for_selling_flow.unwrap_or(true) && !self.international_service.unwrap_or(false)
    }
}

impl EbayClient {
    pub async fn shipping_services(
        &self,
        entry: &MarketplaceEntry,
    ) -> Result<Vec<ShippingService>, UpstreamError> {
        let path = format!(
            "/sell/metadata/v1/shipping/marketplace/{}/get_shipping_services",
            entry.id.ebay_code()
        );
        let payload: ShippingServicesResponse = self
            .send_json("get_shipping_services", TokenScope::User, ApiRequest::get(self.url(&path)))
            .await?;
        Ok(payload.shipping_services)
    }
}
