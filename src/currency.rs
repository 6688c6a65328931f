use crate::cache::CacheStore;
use crate::catalog::MarketplaceId;
use crate::clock::Clock;
use crate::http::{ApiRequest, Transport};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};

pub const ECB_DAILY_FEED_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml";
const SNAPSHOT_CACHE_KEY: &str = "fx:snapshot";

static CUBE_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?Cube\b([^>]*)>").expect("valid cube regex"));
static XML_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+)\s*=\s*['"]([^'"]*)['"]"#).expect("valid attribute regex"));

/// Used when neither a live feed nor a previous snapshot is available.
const FALLBACK_RATES: [(&str, f64); 3] = [("USD", 1.08), ("AUD", 1.65), ("GBP", 0.85)];

#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("rate feed request failed: {0}")]
    Request(String),
    #[error("rate feed returned no rates")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Live,
    Fallback,
}

/// Currency code → units per 1 EUR. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateSnapshot {
    pub rates: BTreeMap<String, f64>,
    pub fetched_at: DateTime<Utc>,
    pub source: RateSource,
}

impl ExchangeRateSnapshot {
    pub fn live(mut rates: BTreeMap<String, f64>, fetched_at: DateTime<Utc>) -> Self {
        rates.insert("EUR".to_string(), 1.0);
        Self {
            rates,
            fetched_at,
            source: RateSource::Live,
        }
    }

    pub fn fallback(now: DateTime<Utc>) -> Self {
        let mut rates: BTreeMap<String, f64> = FALLBACK_RATES
            .iter()
            .map(|(code, rate)| (code.to_string(), *rate))
            .collect();
        rates.insert("EUR".to_string(), 1.0);
        Self {
            rates,
            fetched_at: now,
            source: RateSource::Fallback,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.source == RateSource::Live && now - self.fetched_at < ttl
    }

    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(&currency.to_uppercase()).copied()
    }

    pub fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        convert(amount, from, to, self)
    }
}

/// EUR-pivot conversion. Unknown currencies are treated as parity with EUR.
pub fn convert(amount: f64, from: &str, to: &str, snapshot: &ExchangeRateSnapshot) -> f64 {
    let from = from.to_uppercase();
    let to = to.to_uppercase();
    if from == to {
        return amount;
    }
    let from_rate = snapshot.rate(&from).unwrap_or_else(|| {
        warn!(target = "crosslist.fx", currency = %from, "missing_rate_assuming_parity");
        1.0
    });
    let to_rate = snapshot.rate(&to).unwrap_or_else(|| {
        warn!(target = "crosslist.fx", currency = %to, "missing_rate_assuming_parity");
        1.0
    });
    if from == "EUR" {
        amount * to_rate
    } else if to == "EUR" {
        amount / from_rate
    } else {
        (amount / from_rate) * to_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStyle {
    #[default]
    Clean,
    /// Whole units followed by `.99`.
    Psychological,
}

pub fn round_price(amount: f64, style: PriceStyle) -> String {
    match style {
        PriceStyle::Clean => format!("{amount:.2}"),
        PriceStyle::Psychological => format!("{}.99", amount.trunc() as i64),
    }
}

/// Parses the ECB daily reference XML into `{currency -> units per EUR}`.
pub fn parse_ecb_rates(xml: &str) -> BTreeMap<String, f64> {
    let mut rates = BTreeMap::new();
    for element in CUBE_ELEMENT.captures_iter(xml) {
        let mut currency = None;
        let mut rate = None;
        for attr in XML_ATTRIBUTE.captures_iter(&element[1]) {
            match &attr[1] {
                "currency" => currency = Some(attr[2].trim().to_uppercase()),
                "rate" => rate = attr[2].trim().parse::<f64>().ok(),
                _ => {}
            }
        }
        if let (Some(currency), Some(rate)) = (currency, rate)
            && rate > 0.0
        {
            rates.insert(currency, rate);
        }
    }
    rates
}

#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn fetch_rates(&self) -> Result<BTreeMap<String, f64>, CurrencyError>;
}

pub struct EcbRateFeed {
    transport: Arc<dyn Transport>,
    url: String,
}

impl EcbRateFeed {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateFeed for EcbRateFeed {
    async fn fetch_rates(&self) -> Result<BTreeMap<String, f64>, CurrencyError> {
        let response = self
            .transport
            .send(&ApiRequest::get(&self.url))
            .await
            .map_err(|err| CurrencyError::Request(err.to_string()))?;
        if response.status != 200 {
            return Err(CurrencyError::Request(format!("HTTP {}", response.status)));
        }
        let rates = parse_ecb_rates(&response.body);
        if rates.is_empty() {
            return Err(CurrencyError::Empty);
        }
        Ok(rates)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Money {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShippingRates {
    pub marketplace_id: String,
    pub currency: String,
    pub europe: Money,
    pub americas: Money,
    pub rest_of_world: Money,
    pub rates_timestamp: DateTime<Utc>,
    pub rates_source: RateSource,
}

/// Seller base rates per shipping zone, in the currency they are defined in.
const EUROPE_BASE: (f64, &str) = (10.0, "EUR");
const AMERICAS_BASE: (f64, &str) = (25.0, "USD");
const REST_OF_WORLD_BASE: (f64, &str) = (45.0, "USD");

pub struct CurrencyService {
    feed: Arc<dyn RateFeed>,
    cache: Arc<dyn CacheStore<ExchangeRateSnapshot>>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl CurrencyService {
    pub fn new(
        feed: Arc<dyn RateFeed>,
        cache: Arc<dyn CacheStore<ExchangeRateSnapshot>>,
        clock: Arc<dyn Clock>,
        ttl: TimeDelta,
    ) -> Self {
        Self {
            feed,
            cache,
            clock,
            ttl,
        }
    }

    /// Fresh cache, else live feed, else last good snapshot, else fallback table.
    pub async fn get_rates(&self) -> ExchangeRateSnapshot {
        let now = self.clock.now();
        let cached = self.cache.get(SNAPSHOT_CACHE_KEY).await;
        if let Some(snapshot) = &cached
            && snapshot.is_fresh(now, self.ttl)
        {
            crate::metrics::cache_lookup("fx", true);
            return snapshot.clone();
        }
        crate::metrics::cache_lookup("fx", false);

        match self.feed.fetch_rates().await {
            Ok(rates) => {
                let snapshot = ExchangeRateSnapshot::live(rates, now);
                info!(
                    target = "crosslist.fx",
                    count = snapshot.rates.len(),
                    usd = ?snapshot.rate("USD"),
                    aud = ?snapshot.rate("AUD"),
                    "exchange_rates_refreshed"
                );
                self.cache
                    .set(SNAPSHOT_CACHE_KEY, snapshot.clone(), None)
                    .await;
                snapshot
            }
            Err(err) => {
                warn!(target = "crosslist.fx", error = %err, "exchange_rate_refresh_failed");
                match cached {
                    Some(stale) => stale,
                    None => {
                        warn!(target = "crosslist.fx", "using_fallback_exchange_rates");
                        ExchangeRateSnapshot::fallback(now)
                    }
                }
            }
        }
    }

    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        let snapshot = self.get_rates().await;
        convert(amount, from, to, &snapshot)
    }

    /// Unknown marketplaces settle in USD.
    pub async fn localize_shipping_rates(
        &self,
        marketplace_id: &str,
        style: PriceStyle,
    ) -> ShippingRates {
        let snapshot = self.get_rates().await;
        localize_with(marketplace_id, style, &snapshot)
    }
}

pub fn localize_with(
    marketplace_id: &str,
    style: PriceStyle,
    snapshot: &ExchangeRateSnapshot,
) -> ShippingRates {
    let currency = marketplace_id
        .parse::<MarketplaceId>()
        .map(|id| id.entry().currency)
        .unwrap_or("USD");
    let zone = |(amount, from): (f64, &str)| Money {
        value: round_price(convert(amount, from, currency, snapshot), style),
        currency: currency.to_string(),
    };
    ShippingRates {
        marketplace_id: marketplace_id.to_string(),
        currency: currency.to_string(),
        europe: zone(EUROPE_BASE),
        americas: zone(AMERICAS_BASE),
        rest_of_world: zone(REST_OF_WORLD_BASE),
        rates_timestamp: snapshot.fetched_at,
        rates_source: snapshot.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;

    const ECB_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01" xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
  <gesmes:subject>Reference rates</gesmes:subject>
  <Cube>
    <Cube time='2026-10-16'>
      <Cube currency='USD' rate='1.1000'/>
      <Cube currency='JPY' rate='161.20'/>
      <Cube currency='GBP' rate='0.8600'/>
      <Cube rate='1.7000' currency='AUD'/>
    </Cube>
  </Cube>
</gesmes:Envelope>"#;

    struct StubFeed {
        responses: Mutex<Vec<Result<BTreeMap<String, f64>, CurrencyError>>>,
        calls: Mutex<u32>,
    }

    impl StubFeed {
        fn new(responses: Vec<Result<BTreeMap<String, f64>, CurrencyError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl RateFeed for StubFeed {
        async fn fetch_rates(&self) -> Result<BTreeMap<String, f64>, CurrencyError> {
            *self.calls.lock() += 1;
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Err(CurrencyError::Empty)
            } else {
                responses.remove(0)
            }
        }
    }

    fn service(feed: Arc<StubFeed>, clock: Arc<ManualClock>) -> CurrencyService {
        CurrencyService::new(
            feed,
            Arc::new(MemoryCache::new(clock.clone())),
            clock,
            TimeDelta::hours(12),
        )
    }

    #[test]
    fn parses_ecb_cube_attributes_in_any_order() {
        let rates = parse_ecb_rates(ECB_SAMPLE);
        assert_eq!(rates.len(), 4);
        assert_eq!(rates["USD"], 1.1);
        assert_eq!(rates["AUD"], 1.7);
    }

    #[test]
    fn conversion_round_trips_between_any_pair() {
        let snapshot =
            ExchangeRateSnapshot::live(parse_ecb_rates(ECB_SAMPLE), Utc::now());
        let codes: Vec<String> = snapshot.rates.keys().cloned().collect();
        for a in &codes {
            for b in &codes {
                for amount in [0.01, 12.0, 99.99, 1234.5] {
                    let there = convert(amount, a, b, &snapshot);
                    let back = convert(there, b, a, &snapshot);
                    assert!((back - amount).abs() < 1e-9 * amount.max(1.0), "{a}->{b}");
                }
            }
        }
    }

    #[test]
    fn conversion_pivots_through_eur() {
        let snapshot = ExchangeRateSnapshot::fallback(Utc::now());
        assert_eq!(convert(10.0, "EUR", "USD", &snapshot), 10.0 * 1.08);
        assert_eq!(convert(10.8, "USD", "EUR", &snapshot), 10.8 / 1.08);
        let cross = convert(25.0, "USD", "AUD", &snapshot);
        assert!((cross - 25.0 / 1.08 * 1.65).abs() < 1e-9);
    }

    #[test]
    fn rounding_styles() {
        assert_eq!(round_price(10.8, PriceStyle::Clean), "10.80");
        assert_eq!(round_price(38.19, PriceStyle::Psychological), "38.99");
        assert_eq!(round_price(10.0, PriceStyle::Psychological), "10.99");
    }

    #[test]
    fn shipping_rates_in_settlement_currency() {
        let snapshot = ExchangeRateSnapshot::fallback(Utc::now());
        let de = localize_with("EBAY_DE", PriceStyle::Clean, &snapshot);
        assert_eq!(de.currency, "EUR");
        assert_eq!(de.europe.value, "10.00");
        assert_eq!(de.americas.value, format!("{:.2}", 25.0 / 1.08));

        let us = localize_with("EBAY_US", PriceStyle::Clean, &snapshot);
        assert_eq!(us.europe.value, "10.80");
        assert_eq!(us.americas.value, "25.00");
        assert_eq!(us.rest_of_world.value, "45.00");

        let unknown = localize_with("EBAY_XX", PriceStyle::Psychological, &snapshot);
        assert_eq!(unknown.currency, "USD");
        assert_eq!(unknown.rest_of_world.value, "45.99");
    }

    #[tokio::test]
    async fn fresh_snapshot_is_served_from_cache() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let feed = StubFeed::new(vec![Ok(parse_ecb_rates(ECB_SAMPLE))]);
        let service = service(feed.clone(), clock.clone());

        let first = service.get_rates().await;
        clock.advance(TimeDelta::hours(11));
        let second = service.get_rates().await;
        assert_eq!(first, second);
        assert_eq!(first.source, RateSource::Live);
        assert_eq!(*feed.calls.lock(), 1);
    }

    #[tokio::test]
    async fn stale_snapshot_refreshes_and_survives_feed_failure() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let feed = StubFeed::new(vec![
            Ok(parse_ecb_rates(ECB_SAMPLE)),
            Err(CurrencyError::Request("HTTP 503".into())),
        ]);
        let service = service(feed.clone(), clock.clone());

        let first = service.get_rates().await;
        clock.advance(TimeDelta::hours(13));
        let second = service.get_rates().await;
        assert_eq!(*feed.calls.lock(), 2);
        assert_eq!(second, first, "last good snapshot is kept");
        assert_eq!(second.rate("USD"), Some(1.1));
    }

    #[tokio::test]
    async fn fallback_table_when_nothing_is_available() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let feed = StubFeed::new(vec![Err(CurrencyError::Empty)]);
        let service = service(feed, clock);
        let snapshot = service.get_rates().await;
        assert_eq!(snapshot.source, RateSource::Fallback);
        assert_eq!(snapshot.rate("GBP"), Some(0.85));
        assert_eq!(snapshot.rate("EUR"), Some(1.0));
    }
}
