use crate::catalog::MarketplaceEntry;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EbayEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl EbayEnvironment {
    pub fn from_raw(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "PROD" | "PRODUCTION" => EbayEnvironment::Production,
            _ => EbayEnvironment::Sandbox,
        }
    }

    pub fn api_root(&self) -> &'static str {
        match self {
            EbayEnvironment::Sandbox => "https://api.sandbox.ebay.com",
            EbayEnvironment::Production => "https://api.ebay.com",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EbayConfig {
    pub environment: EbayEnvironment,
    pub app_id: String,
    pub cert_id: String,
    pub refresh_token: String,
    /// Pre-minted user token; bypasses the OAuth refresh flow when set.
    pub access_token: Option<String>,
}

impl EbayConfig {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).unwrap_or_default();
        Self {
            environment: EbayEnvironment::from_raw(
                &env::var("EBAY_ENV").unwrap_or_else(|_| "SANDBOX".to_string()),
            ),
            app_id: var("EBAY_APP_ID"),
            cert_id: var("EBAY_CERT_ID"),
            refresh_token: var("EBAY_REFRESH_TOKEN"),
            access_token: env::var("EBAY_ACCESS_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
        }
    }

    pub fn sandbox() -> Self {
        Self::default()
    }

    pub fn api_root(&self) -> &'static str {
        self.environment.api_root()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root(), path)
    }

    pub fn oauth_token_url(&self) -> String {
        self.url("/identity/v1/oauth2/token")
    }

    /// Public item page for a published listing.
    pub fn listing_url(&self, entry: &MarketplaceEntry, listing_id: &str) -> String {
        match self.environment {
            EbayEnvironment::Sandbox => format!("https://sandbox.ebay.com/itm/{listing_id}"),
            EbayEnvironment::Production => {
                format!("https://www.{}/itm/{listing_id}", entry.domain)
            }
        }
    }
}
