use crate::ebay::auth::EbayAuthError;
use crate::executor::{Executed, ExecutorError, is_retryable_status};
use crate::http::{ApiResponse, truncate};
use serde::Deserialize;
use thiserror::Error;

pub const ERROR_BODY_LIMIT: usize = 500;

/// "Offer entity already exists"; carries the existing `offerId` parameter.
pub const ERROR_OFFER_EXISTS: i64 = 25002;
/// Merchant location key already taken.
pub const ERROR_LOCATION_EXISTS: i64 = 25803;
/// Business policy with the same name already exists.
pub const ERROR_DUPLICATE_POLICY: i64 = 20400;
const ERROR_INVALID_SKU: i64 = 25702;
const ERROR_OFFER_NOT_FOUND: i64 = 25713;
const ERROR_ITEM_NOT_FOUND: i64 = 25710;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamClass {
    /// 429, 5xx, timeouts and broken connections; retried before surfacing.
    Transient,
    /// Any other rejection. Surfaced as-is.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed{} after {attempts} attempt(s): {message}", http_status(.status))]
pub struct UpstreamError {
    pub operation: &'static str,
    pub class: UpstreamClass,
    pub status: Option<u16>,
    /// Truncated upstream body or transport message.
    pub message: String,
    pub attempts: u32,
}

fn http_status(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" with HTTP {status}"))
        .unwrap_or_default()
}

impl UpstreamError {
    pub fn from_response(operation: &'static str, executed: &Executed) -> Self {
        let status = executed.response.status;
        Self {
            operation,
            class: if is_retryable_status(status) {
                UpstreamClass::Transient
            } else {
                UpstreamClass::Permanent
            },
            status: Some(status),
            message: truncate(&executed.response.body, ERROR_BODY_LIMIT),
            attempts: executed.attempts,
        }
    }

    pub fn from_executor(operation: &'static str, err: ExecutorError) -> Self {
        Self {
            operation,
            class: UpstreamClass::Transient,
            status: None,
            attempts: err.attempts(),
            message: err.to_string(),
        }
    }

    pub fn from_auth(operation: &'static str, err: EbayAuthError) -> Self {
        Self {
            operation,
            class: UpstreamClass::Permanent,
            status: None,
            message: err.to_string(),
            attempts: 0,
        }
    }

    pub fn decode(operation: &'static str, err: serde_json::Error, attempts: u32) -> Self {
        Self {
            operation,
            class: UpstreamClass::Permanent,
            status: None,
            message: format!("malformed json: {err}"),
            attempts,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class == UpstreamClass::Transient
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(String),
    /// The entity was there already; the id is known when eBay reports it.
    AlreadyExists(Option<String>),
    Failed(UpstreamError),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<EbayErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EbayErrorDetail {
    #[serde(default)]
    pub error_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ErrorParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorParameter {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl EbayErrorDetail {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .and_then(|p| p.value.as_deref())
    }
}

pub fn parse_errors(response: &ApiResponse) -> Vec<EbayErrorDetail> {
    response
        .json::<ErrorEnvelope>()
        .map(|envelope| envelope.errors)
        .unwrap_or_default()
}

pub fn has_error_id(response: &ApiResponse, id: i64) -> bool {
    parse_errors(response)
        .iter()
        .any(|detail| detail.error_id == Some(id))
}

/// 404 or one of eBay's "no such SKU/offer" error ids.
pub fn is_not_found(response: &ApiResponse) -> bool {
    response.status == 404
        || parse_errors(response).iter().any(|detail| {
            matches!(
                detail.error_id,
                Some(ERROR_ITEM_NOT_FOUND | ERROR_OFFER_NOT_FOUND | ERROR_INVALID_SKU)
            )
        })
}
