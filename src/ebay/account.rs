use crate::catalog::MarketplaceEntry;
use crate::ebay::auth::TokenScope;
use crate::ebay::client::EbayClient;
use crate::ebay::error::{CreateOutcome, ERROR_DUPLICATE_POLICY, UpstreamError, parse_errors};
use crate::http::ApiRequest;
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Fulfillment,
    Payment,
    Return,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [PolicyKind::Fulfillment, PolicyKind::Payment, PolicyKind::Return];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Fulfillment => "fulfillment",
            PolicyKind::Payment => "payment",
            PolicyKind::Return => "return",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            PolicyKind::Fulfillment => "/sell/account/v1/fulfillment_policy",
            PolicyKind::Payment => "/sell/account/v1/payment_policy",
            PolicyKind::Return => "/sell/account/v1/return_policy",
        }
    }

    fn id_field(&self) -> &'static str {
        match self {
            PolicyKind::Fulfillment => "fulfillmentPolicyId",
            PolicyKind::Payment => "paymentPolicyId",
            PolicyKind::Return => "returnPolicyId",
        }
    }

    fn list_field(&self) -> &'static str {
        match self {
            PolicyKind::Fulfillment => "fulfillmentPolicies",
            PolicyKind::Payment => "paymentPolicies",
            PolicyKind::Return => "returnPolicies",
        }
    }

    /// Policy name used when bootstrapping a marketplace.
    pub fn default_name(&self, entry: &MarketplaceEntry) -> String {
        let label = match self {
            PolicyKind::Fulfillment => "Shipping",
            PolicyKind::Payment => "Payment",
            PolicyKind::Return => "Returns",
        };
        format!("Crosslist {label} {}", entry.country_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySummary {
    pub id: String,
    pub name: String,
}

pub fn policy_payload(
    kind: PolicyKind,
    entry: &MarketplaceEntry,
    shipping_service: &str,
    shipping_cost: f64,
) -> Value {
    let marketplace = entry.id.ebay_code();
    let name = kind.default_name(entry);
    let category_types = json!([{"name": "ALL_EXCLUDING_MOTORS_VEHICLES"}]);
    match kind {
        PolicyKind::Fulfillment => json!({
            "name": name,
            "marketplaceId": marketplace,
            "categoryTypes": category_types,
            "handlingTime": {"value": 3, "unit": "DAY"},
            "shippingOptions": [{
                "optionType": "DOMESTIC",
                "costType": "FLAT_RATE",
                "shippingServices": [{
                    "sortOrder": 1,
                    "shippingServiceCode": shipping_service,
                    "shippingCost": {
                        "value": format!("{shipping_cost:.2}"),
                        "currency": entry.currency,
                    },
                    "freeShipping": false,
                }],
            }],
        }),
        PolicyKind::Payment => json!({
            "name": name,
            "marketplaceId": marketplace,
            "categoryTypes": category_types,
            "immediatePay": true,
        }),
        PolicyKind::Return => json!({
            "name": name,
            "marketplaceId": marketplace,
            "categoryTypes": category_types,
            "returnsAccepted": true,
            "returnPeriod": {"value": 30, "unit": "DAY"},
            "returnShippingCostPayer": "BUYER",
            "refundMethod": "MONEY_BACK",
        }),
    }
}

impl EbayClient {
    pub async fn list_policies(
        &self,
        kind: PolicyKind,
        entry: &MarketplaceEntry,
    ) -> Result<Vec<PolicySummary>, UpstreamError> {
        let request =
            ApiRequest::get(self.url(kind.path())).query("marketplace_id", entry.id.ebay_code());
        let payload: Value = self
            .send_json("list_policies", TokenScope::User, request)
            .await?;
        let policies = payload
            .get(kind.list_field())
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(PolicySummary {
                            id: item.get(kind.id_field())?.as_str()?.to_string(),
                            name: item
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(policies)
    }

    pub async fn create_policy(&self, kind: PolicyKind, payload: Value) -> CreateOutcome {
        let request = ApiRequest::post(self.url(kind.path())).json(payload);
        let executed = match self.send("create_policy", TokenScope::User, request).await {
            Ok(executed) => executed,
            Err(err) => return CreateOutcome::Failed(err),
        };
        let response = &executed.response;
        if response.is_success() {
            let id = response
                .json::<Value>()
                .ok()
                .and_then(|body| body.get(kind.id_field())?.as_str().map(str::to_string));
            return match id {
                Some(id) => CreateOutcome::Created(id),
                None => CreateOutcome::Failed(UpstreamError::from_response(
                    "create_policy",
                    &executed,
                )),
            };
        }
        let duplicate = parse_errors(response)
            .into_iter()
            .find(|detail| detail.error_id == Some(ERROR_DUPLICATE_POLICY));
        match duplicate {
            Some(detail) => CreateOutcome::AlreadyExists(
                detail
                    .parameter("DuplicateProfileId")
                    .map(str::to_string),
            ),
            None => CreateOutcome::Failed(UpstreamError::from_response("create_policy", &executed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MarketplaceId;

    #[test]
    fn fulfillment_payload_uses_marketplace_currency() {
        let entry = MarketplaceId::EbayGb.entry();
        let payload = policy_payload(
            PolicyKind::Fulfillment,
            entry,
            "UK_RoyalMailFirstClassStandard",
            10.0,
        );
        let service = &payload["shippingOptions"][0]["shippingServices"][0];
        assert_eq!(service["shippingCost"]["currency"], "GBP");
        assert_eq!(service["shippingCost"]["value"], "10.00");
        assert_eq!(payload["name"], "Crosslist Shipping GB");
    }

    #[test]
    fn return_payload_is_thirty_days_buyer_paid() {
        let payload = policy_payload(PolicyKind::Return, MarketplaceId::EbayUs.entry(), "", 0.0);
        assert_eq!(payload["returnPeriod"]["value"], 30);
        assert_eq!(payload["returnShippingCostPayer"], "BUYER");
    }
}
