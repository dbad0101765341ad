//! Exchange rates into the reporting currency
//!
//! Resolution order for a run:
//! 1. On-disk cache younger than the freshness window
//! 2. Remote daily feed (persisted to the cache on success)
//! 3. Built-in fallback table, substituted whole
//!
//! [`RateProvider::get_rates`] never fails; problems are logged and the next
//! layer is tried. The resulting [`RateTable`] is a plain value handed to the
//! parsers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::round2;

/// Currency every ledger amount is converted into
pub const REPORTING_CURRENCY: &str = "RUB";

/// Foreign currencies the feed must provide
pub const SUPPORTED_CURRENCIES: [&str; 4] = ["GEL", "USD", "EUR", "GBP"];

/// Daily rates relative to the reporting currency
pub const DEFAULT_RATES_URL: &str = "http://www.floatrates.com/daily/rub.json";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Rates used when neither cache nor feed is available
pub const FALLBACK_RATES: [(&str, f64); 5] = [
    ("GEL", 28.5),
    ("USD", 76.7),
    ("EUR", 90.4),
    ("GBP", 104.1),
    ("RUB", 1.0),
];

/// Where a rate table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateOrigin {
    Cache,
    Remote,
    Fallback,
}

impl RateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Remote => "remote",
            Self::Fallback => "fallback",
        }
    }
}

/// Currency → rate into the reporting currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateTable {
    pub rates: BTreeMap<String, f64>,
    pub fetched_at: DateTime<Utc>,
    pub origin: RateOrigin,
}

impl RateTable {
    pub fn new(rates: BTreeMap<String, f64>, fetched_at: DateTime<Utc>, origin: RateOrigin) -> Self {
        let mut rates = rates;
        rates.insert(REPORTING_CURRENCY.to_string(), 1.0);
        Self {
            rates,
            fetched_at,
            origin,
        }
    }

    /// The built-in table
    pub fn fallback(now: DateTime<Utc>) -> Self {
        let rates = FALLBACK_RATES
            .iter()
            .map(|(code, rate)| (code.to_string(), *rate))
            .collect();
        Self::new(rates, now, RateOrigin::Fallback)
    }

    /// Rate for a currency; unknown currencies convert at 1.0
    pub fn rate(&self, currency: &str) -> f64 {
        self.rates
            .get(currency.trim().to_uppercase().as_str())
            .copied()
            .unwrap_or(1.0)
    }

    /// Convert into the reporting currency, rounded to cents
    pub fn to_reporting(&self, amount: f64, currency: &str) -> f64 {
        round2(amount * self.rate(currency))
    }

    /// True when every supported currency has a usable rate
    fn is_complete(&self) -> bool {
        SUPPORTED_CURRENCIES.iter().all(|code| {
            self.rates
                .get(*code)
                .is_some_and(|r| r.is_finite() && *r > 0.0)
        })
    }
}

/// A remote or static supplier of daily rates
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Fetch rates for every supported currency
    async fn fetch(&self) -> Result<BTreeMap<String, f64>>;
}

/// floatrates.com daily feed
pub struct FloatRatesSource {
    http_client: Client,
    url: String,
}

/// One currency entry of the feed. Other fields are ignored.
#[derive(Debug, Deserialize)]
struct FloatRateEntry {
    #[serde(rename = "inverseRate")]
    inverse_rate: Option<f64>,
}

impl FloatRatesSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl RateSource for FloatRatesSource {
    fn name(&self) -> &str {
        "floatrates"
    }

    async fn fetch(&self) -> Result<BTreeMap<String, f64>> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        let body: HashMap<String, FloatRateEntry> = response.json().await?;
        parse_floatrates(&body)
    }
}

/// Pick the supported currencies out of a floatrates document.
///
/// Keys are lowercase currency codes. A missing or non-positive rate fails the
/// whole document so the fallback table is used instead of a partial merge.
fn parse_floatrates(body: &HashMap<String, FloatRateEntry>) -> Result<BTreeMap<String, f64>> {
    let mut rates = BTreeMap::new();
    for code in SUPPORTED_CURRENCIES {
        let rate = body
            .get(&code.to_lowercase())
            .and_then(|entry| entry.inverse_rate)
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| Error::RateSource(format!("Feed has no usable rate for {}", code)))?;
        rates.insert(code.to_string(), round2(rate));
    }
    Ok(rates)
}

/// Fixed rates, or a source that always fails
pub struct StaticRateSource {
    rates: Option<BTreeMap<String, f64>>,
}

impl StaticRateSource {
    pub fn new(rates: BTreeMap<String, f64>) -> Self {
        Self { rates: Some(rates) }
    }

    /// A source that is never reachable
    pub fn unavailable() -> Self {
        Self { rates: None }
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<BTreeMap<String, f64>> {
        self.rates
            .clone()
            .ok_or_else(|| Error::RateSource("Static source unavailable".to_string()))
    }
}

/// On-disk cache document
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    timestamp: DateTime<Utc>,
    rates: BTreeMap<String, f64>,
}

/// Cache → remote → fallback resolution
pub struct RateProvider {
    source: Box<dyn RateSource>,
    cache_path: Option<PathBuf>,
    max_age: Duration,
}

impl RateProvider {
    pub fn new(source: Box<dyn RateSource>) -> Self {
        Self {
            source,
            cache_path: None,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn with_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Rates in effect now
    pub async fn get_rates(&self) -> RateTable {
        self.get_rates_at(Utc::now()).await
    }

    /// Rates in effect at `now`
    pub async fn get_rates_at(&self, now: DateTime<Utc>) -> RateTable {
        if let Some(table) = self.read_cache(now) {
            info!(
                "Using cached rates from {}",
                table.fetched_at.format("%Y-%m-%d %H:%M")
            );
            return table;
        }
        self.fetch_or_fallback(now).await
    }

    /// Skip the cache and go to the remote source
    pub async fn refresh(&self) -> RateTable {
        self.fetch_or_fallback(Utc::now()).await
    }

    async fn fetch_or_fallback(&self, now: DateTime<Utc>) -> RateTable {
        match self.source.fetch().await {
            Ok(rates) => {
                let table = RateTable::new(rates, now, RateOrigin::Remote);
                info!(
                    "Fetched rates from {}: USD={} EUR={} GEL={}",
                    self.source.name(),
                    table.rate("USD"),
                    table.rate("EUR"),
                    table.rate("GEL")
                );
                self.write_cache(&table);
                table
            }
            Err(e) => {
                warn!(
                    "Rate source {} unavailable ({}), using fallback rates",
                    self.source.name(),
                    e
                );
                RateTable::fallback(now)
            }
        }
    }

    fn read_cache(&self, now: DateTime<Utc>) -> Option<RateTable> {
        let path = self.cache_path.as_ref()?;
        if !path.exists() {
            return None;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read rate cache {}: {}", path.display(), e);
                return None;
            }
        };
        let cache: CacheFile = match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Ignoring corrupt rate cache {}: {}", path.display(), e);
                return None;
            }
        };

        let age = now.signed_duration_since(cache.timestamp);
        let max_age = chrono::Duration::from_std(self.max_age).ok()?;
        if age < chrono::Duration::zero() || age >= max_age {
            debug!("Rate cache is stale ({} minutes old)", age.num_minutes());
            return None;
        }

        let table = RateTable::new(cache.rates, cache.timestamp, RateOrigin::Cache);
        if !table.is_complete() {
            warn!("Ignoring incomplete rate cache {}", path.display());
            return None;
        }
        Some(table)
    }

    fn write_cache(&self, table: &RateTable) {
        let Some(path) = self.cache_path.as_ref() else {
            return;
        };

        let cache = CacheFile {
            timestamp: table.fetched_at,
            rates: table.rates.clone(),
        };
        let result = serde_json::to_string_pretty(&cache)
            .map_err(Error::from)
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, json)?;
                Ok(())
            });

        if let Err(e) = result {
            warn!("Failed to write rate cache {}: {}", path.display(), e);
        }
    }
}

/// Default cache location
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("coffer").join("exchange_rates.json"))
}
