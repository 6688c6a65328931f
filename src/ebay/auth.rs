use crate::clock::Clock;
use crate::ebay::config::EbayConfig;
use crate::http::{ApiRequest, Transport};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

const USER_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope/sell.inventory",
    "https://api.ebay.com/oauth/api_scope/sell.account",
];
const APPLICATION_SCOPES: &[&str] = &["https://api.ebay.com/oauth/api_scope"];
/// Tokens are refreshed this long before eBay says they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum EbayAuthError {
    #[error("missing ebay app credentials in env")]
    MissingCredentials,
    #[error("missing ebay refresh token in env")]
    MissingRefreshToken,
    #[error("oauth request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// Seller-delegated token for inventory, offer and account calls.
    User,
    /// Client-credentials token for taxonomy lookups.
    Application,
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, scope: TokenScope) -> Result<String, EbayAuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    7200
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct OAuthTokenProvider {
    transport: Arc<dyn Transport>,
    config: EbayConfig,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<TokenScope, CachedToken>>,
}

impl OAuthTokenProvider {
    pub fn new(transport: Arc<dyn Transport>, config: EbayConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            config,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn basic_auth_header(&self) -> Result<String, EbayAuthError> {
        if self.config.app_id.is_empty() || self.config.cert_id.is_empty() {
            return Err(EbayAuthError::MissingCredentials);
        }
        let raw = format!("{}:{}", self.config.app_id, self.config.cert_id);
        Ok(format!("Basic {}", BASE64.encode(raw)))
    }

    async fn request_token(
        &self,
        scope: TokenScope,
    ) -> Result<TokenResponse, EbayAuthError> {
        let authorization = self.basic_auth_header()?;
        let request = match scope {
            TokenScope::User => {
                if self.config.refresh_token.is_empty() {
                    return Err(EbayAuthError::MissingRefreshToken);
                }
                let scopes = USER_SCOPES.join(" ");
                ApiRequest::post(self.config.oauth_token_url()).form(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", self.config.refresh_token.as_str()),
                    ("scope", scopes.as_str()),
                ])
            }
            TokenScope::Application => {
                let scopes = APPLICATION_SCOPES.join(" ");
                ApiRequest::post(self.config.oauth_token_url()).form(&[
                    ("grant_type", "client_credentials"),
                    ("scope", scopes.as_str()),
                ])
            }
        }
        .header("Authorization", authorization);

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|err| EbayAuthError::Request(err.to_string()))?;
        if !response.is_success() {
            return Err(EbayAuthError::Request(format!(
                "HTTP {}: {}",
                response.status,
                response.body_preview()
            )));
        }
        response
            .json::<TokenResponse>()
            .map_err(|err| EbayAuthError::Request(err.to_string()))
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self, scope: TokenScope) -> Result<String, EbayAuthError> {
        // Held across the refresh so concurrent callers wait for one exchange.
        let mut cache = self.cache.lock().await;
        let now = self.clock.now();
        if let Some(cached) = cache.get(&scope)
            && cached.expires_at > now
        {
            return Ok(cached.token.clone());
        }

        let fresh = self.request_token(scope).await?;
        let lifetime = (fresh.expires_in - EXPIRY_MARGIN_SECS).max(0);
        info!(
            target = "crosslist.ebay",
            scope = ?scope,
            expires_in = fresh.expires_in,
            "oauth_token_refreshed"
        );
        cache.insert(
            scope,
            CachedToken {
                token: fresh.access_token.clone(),
                expires_at: now + TimeDelta::seconds(lifetime),
            },
        );
        Ok(fresh.access_token)
    }
}

/// Hands out one fixed token for every scope.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self, _scope: TokenScope) -> Result<String, EbayAuthError> {
        Ok(self.token.clone())
    }
}
