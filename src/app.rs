use crate::cache::{CacheStore, MemoryCache, RedisCache};
use crate::category::CategoryResolver;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::currency::{CurrencyService, EcbRateFeed, ExchangeRateSnapshot};
use crate::ebay::{EbayClient, OAuthTokenProvider, StaticTokenProvider, TokenProvider};
use crate::executor::ResilientExecutor;
use crate::http::{ReqwestTransport, Transport};
use crate::locks::DraftLocks;
use crate::store::{DraftStore, MemoryStore, SettingsStore, SupabaseStore};
use std::sync::Arc;
use tracing::{info, warn};

/// The three advisory caches, all backed by the same kind of store.
pub struct Caches {
    pub fx: Arc<dyn CacheStore<ExchangeRateSnapshot>>,
    pub categories: Arc<dyn CacheStore<String>>,
    pub aspects: Arc<dyn CacheStore<Vec<String>>>,
}

impl Caches {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            fx: Arc::new(MemoryCache::new(clock.clone())),
            categories: Arc::new(MemoryCache::new(clock.clone())),
            aspects: Arc::new(MemoryCache::new(clock)),
        }
    }

    pub fn redis(client: redis::Client) -> Self {
        Self {
            fx: Arc::new(RedisCache::new(client.clone(), "crosslist")),
            categories: Arc::new(RedisCache::new(client.clone(), "crosslist")),
            aspects: Arc::new(RedisCache::new(client, "crosslist")),
        }
    }
}

/// Swappable edges of the context; tests replace every one of them.
pub struct Backends {
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<dyn TokenProvider>,
    pub drafts: Arc<dyn DraftStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub caches: Caches,
}

pub struct AppContext {
    pub config: AppConfig,
    pub ebay: Arc<EbayClient>,
    pub currency: Arc<CurrencyService>,
    pub categories: Arc<CategoryResolver>,
    pub drafts: Arc<dyn DraftStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub locks: Arc<DraftLocks>,
}

impl AppContext {
    pub fn new(config: AppConfig, backends: Backends) -> Self {
        let executor = ResilientExecutor::new(backends.transport.clone(), config.retry);
        let ebay = Arc::new(EbayClient::new(
            executor,
            backends.tokens,
            config.ebay.clone(),
        ));
        let feed = Arc::new(EcbRateFeed::new(
            backends.transport,
            config.fx_feed_url.clone(),
        ));
        let currency = Arc::new(CurrencyService::new(
            feed,
            backends.caches.fx,
            backends.clock,
            config.fx_ttl,
        ));
        let categories = Arc::new(CategoryResolver::new(
            ebay.clone(),
            backends.caches.categories,
            backends.caches.aspects,
            config.category_ttl,
        ));
        Self {
            config,
            ebay,
            currency,
            categories,
            drafts: backends.drafts,
            settings: backends.settings,
            locks: Arc::new(DraftLocks::new()),
        }
    }

    /// Production wiring: reqwest transport, OAuth unless a static token is
    /// configured, Redis caches and Supabase storage when their env is present.
    pub fn from_config(config: AppConfig) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let tokens: Arc<dyn TokenProvider> = match &config.ebay.access_token {
            Some(token) => {
                info!(target = "crosslist.ebay", "using_static_access_token");
                Arc::new(StaticTokenProvider::new(token.clone()))
            }
            None => Arc::new(OAuthTokenProvider::new(
                transport.clone(),
                config.ebay.clone(),
                clock.clone(),
            )),
        };

        let redis = config
            .redis_url
            .as_deref()
            .and_then(|url| match redis::Client::open(url) {
                Ok(client) => Some(client),
                Err(err) => {
                    warn!(target = "crosslist.cache", error = %err, "redis_url_invalid");
                    None
                }
            });
        let caches = match redis {
            Some(client) => Caches::redis(client),
            None => Caches::in_memory(clock.clone()),
        };

        let (drafts, settings): (Arc<dyn DraftStore>, Arc<dyn SettingsStore>) =
            match (&config.supabase_url, &config.supabase_service_key) {
                (Some(url), Some(key)) => {
                    let store = Arc::new(SupabaseStore::new(url, key, transport.clone()));
                    (store.clone(), store)
                }
                _ => {
                    warn!(
                        target = "crosslist.store",
                        "supabase_not_configured_using_memory_store"
                    );
                    let store = Arc::new(MemoryStore::new());
                    (store.clone(), store)
                }
            };

        Self::new(
            config,
            Backends {
                transport,
                clock,
                tokens,
                drafts,
                settings,
                caches,
            },
        )
    }
}
