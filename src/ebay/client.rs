use crate::catalog::MarketplaceEntry;
use crate::ebay::auth::{TokenProvider, TokenScope};
use crate::ebay::config::EbayConfig;
use crate::ebay::error::UpstreamError;
use crate::executor::{Executed, ResilientExecutor};
use crate::http::ApiRequest;
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Instant};
use tracing::debug;

/// Authenticated, retrying access to the eBay REST APIs.
pub struct EbayClient {
    executor: ResilientExecutor,
    tokens: Arc<dyn TokenProvider>,
    config: EbayConfig,
}

impl EbayClient {
    pub fn new(
        executor: ResilientExecutor,
        tokens: Arc<dyn TokenProvider>,
        config: EbayConfig,
    ) -> Self {
        Self {
            executor,
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &EbayConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        self.config.url(path)
    }

    /// Sends through the retry executor. Non-2xx responses are returned, not
    /// raised; only auth and transport failures become errors here.
    pub async fn send(
        &self,
        operation: &'static str,
        scope: TokenScope,
        request: ApiRequest,
    ) -> Result<Executed, UpstreamError> {
        let token = self
            .tokens
            .access_token(scope)
            .await
            .map_err(|err| UpstreamError::from_auth(operation, err))?;
        let request = request
            .bearer(&token)
            .header("Accept", "application/json");
        let started = Instant::now();
        let executed = self
            .executor
            .execute(&request)
            .await
            .map_err(|err| UpstreamError::from_executor(operation, err))?;
        debug!(
            target = "crosslist.ebay",
            operation,
            method = request.method.as_str(),
            status = executed.response.status,
            attempts = executed.attempts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ebay_call"
        );
        Ok(executed)
    }

    /// Like [`send`](Self::send) but any non-2xx response is an error.
    pub async fn send_ok(
        &self,
        operation: &'static str,
        scope: TokenScope,
        request: ApiRequest,
    ) -> Result<Executed, UpstreamError> {
        let executed = self.send(operation, scope, request).await?;
        if executed.response.is_success() {
            Ok(executed)
        } else {
            Err(UpstreamError::from_response(operation, &executed))
        }
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        scope: TokenScope,
        request: ApiRequest,
    ) -> Result<T, UpstreamError> {
        let executed = self.send_ok(operation, scope, request).await?;
        executed
            .response
            .json::<T>()
            .map_err(|err| UpstreamError::decode(operation, err, executed.attempts))
    }
}

/// Headers eBay needs to route inventory and offer calls to the right site.
pub fn with_marketplace_headers(request: ApiRequest, entry: &MarketplaceEntry) -> ApiRequest {
    request
        .header("Content-Language", entry.locale)
        .header("Accept-Language", entry.locale)
        .header("X-EBAY-C-MARKETPLACE-ID", entry.id.ebay_code())
}
