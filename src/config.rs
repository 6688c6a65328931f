use crate::currency::ECB_DAILY_FEED_URL;
use crate::ebay::EbayConfig;
use crate::executor::RetryPolicy;
use chrono::TimeDelta;
use std::{env, time::Duration};

/// Process configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ebay: EbayConfig,
    pub retry: RetryPolicy,
    pub fx_feed_url: String,
    pub fx_ttl: TimeDelta,
    pub category_ttl: Duration,
    /// Currency draft prices are entered in.
    pub base_currency: String,
    /// Prefix for relative image paths; they are sent as-is when unset.
    pub public_base_url: Option<String>,
    pub redis_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ebay: EbayConfig::sandbox(),
            retry: RetryPolicy::default(),
            fx_feed_url: ECB_DAILY_FEED_URL.to_string(),
            fx_ttl: TimeDelta::hours(12),
            category_ttl: Duration::from_secs(86_400),
            base_currency: "EUR".to_string(),
            public_base_url: None,
            redis_url: None,
            supabase_url: None,
            supabase_service_key: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_retries: parse_env("EBAY_MAX_RETRIES")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.retry.max_retries),
            base_delay: parse_env("EBAY_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_delay),
            ..defaults.retry
        };
        Self {
            ebay: EbayConfig::from_env(),
            retry,
            fx_feed_url: non_empty_env("FX_FEED_URL").unwrap_or(defaults.fx_feed_url),
            fx_ttl: parse_env("FX_CACHE_TTL_HOURS")
                .map(TimeDelta::hours)
                .unwrap_or(defaults.fx_ttl),
            category_ttl: parse_env("CATEGORY_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.category_ttl),
            base_currency: non_empty_env("BASE_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.base_currency),
            public_base_url: non_empty_env("PUBLIC_BASE_URL"),
            redis_url: non_empty_env("REDIS_URL"),
            supabase_url: non_empty_env("SUPABASE_URL"),
            supabase_service_key: non_empty_env("SUPABASE_SERVICE_ROLE_KEY")
                .or_else(|| non_empty_env("SUPABASE_SERVICE_KEY")),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_env(name).and_then(|value| value.parse().ok())
}
