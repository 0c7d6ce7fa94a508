//! Market data provider client.
//!
//! Fetches daily price bars and latest traded prices from the provider's
//! HTTP API. Provider outages are degradable: the client serves the
//! last-known quote flagged stale instead of failing, and only errors when
//! no cached quote exists.

use std::collections::HashMap;
use std::time::Duration;

use backoff::ExponentialBackoff;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{BarPeriod, PriceBar};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One row of the provider's daily price dataset.
#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    stock_id: String,
    open: f64,
    #[serde(rename = "max")]
    high: f64,
    #[serde(rename = "min")]
    low: f64,
    close: f64,
    #[serde(rename = "Trading_Volume")]
    volume: u64,
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    msg: String,
    status: u16,
    #[serde(default)]
    data: Vec<PriceRow>,
}

/// Latest traded price for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub price: f64,
    pub timestamp: DateTime<Utc>,

    /// True when served from cache past the staleness window
    pub stale: bool,
}

/// Read-only client for the market data provider.
pub struct QuoteClient {
    client: Client,
    base_url: String,
    token: Option<String>,

    /// Last-known quote per symbol, for degraded operation
    cache: RwLock<HashMap<String, (f64, DateTime<Utc>)>>,

    staleness: chrono::Duration,

    /// Retry budget for a latest-price fetch before the cache fallback
    retry_budget: Duration,
}

impl QuoteClient {
    pub fn new(
        base_url: String,
        staleness_secs: i64,
        retry_secs: u64,
    ) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: std::env::var("MARKET_DATA_TOKEN").ok(),
            cache: RwLock::new(HashMap::new()),
            staleness: chrono::Duration::seconds(staleness_secs),
            retry_budget: Duration::from_secs(retry_secs),
        })
    }

    async fn fetch_rows(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, EngineError> {
        let mut url = format!(
            "{}/api/v4/data?dataset=TaiwanStockPrice&data_id={}&start_date={}&end_date={}",
            self.base_url, symbol, start, end
        );
        if let Some(token) = &self.token {
            url = format!("{}&token={}", url, token);
        }

        debug!(symbol, %start, %end, "fetching price history");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::ProviderUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::ProviderUnavailable(format!(
                "price request failed: {} - {}",
                status, body
            )));
        }

        let parsed: DataResponse = response
            .json()
            .await
            .map_err(|e| EngineError::ProviderUnavailable(e.to_string()))?;

        if parsed.status != 200 {
            return Err(EngineError::ProviderUnavailable(format!(
                "provider status {}: {}",
                parsed.status, parsed.msg
            )));
        }
        Ok(parsed.data)
    }

    /// Fetch ordered daily bars for one symbol, retrying transient failures
    /// with exponential backoff.
    pub async fn get_price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, EngineError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        };

        let rows = backoff::future::retry(policy, || async {
            self.fetch_rows(symbol, start, end)
                .await
                .map_err(backoff::Error::transient)
        })
        .await?;

        let mut bars: Vec<PriceBar> = rows
            .into_iter()
            .map(|row| PriceBar {
                symbol: row.stock_id,
                timestamp: row
                    .date
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_default()
                    .and_utc(),
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                period: BarPeriod::Daily,
            })
            .collect();
        bars.sort_by_key(|b| b.timestamp);

        // refresh the quote cache from the newest bar
        if let Some(last) = bars.last() {
            let mut cache = self.cache.write().await;
            cache.insert(symbol.to_string(), (last.close, Utc::now()));
        }
        Ok(bars)
    }

    /// Latest traded price for one symbol, retried within a bounded backoff
    /// budget. Falls back to the cached quote once the budget is exhausted,
    /// flagging it stale past the staleness window; errors only when there
    /// is nothing cached.
    pub async fn get_latest_price(&self, symbol: &str) -> Result<Quote, EngineError> {
        let today = Utc::now().date_naive();
        let start = today - chrono::Duration::days(7);

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.retry_budget),
            ..ExponentialBackoff::default()
        };
        let fetched = backoff::future::retry(policy, || async {
            self.fetch_rows(symbol, start, today)
                .await
                .map_err(backoff::Error::transient)
        })
        .await;

        match fetched {
            Ok(rows) if !rows.is_empty() => {
                let last = rows
                    .iter()
                    .max_by_key(|r| r.date)
                    .ok_or_else(|| EngineError::ProviderUnavailable("empty dataset".into()))?;
                let now = Utc::now();
                let mut cache = self.cache.write().await;
                cache.insert(symbol.to_string(), (last.close, now));
                Ok(Quote {
                    price: last.close,
                    timestamp: now,
                    stale: false,
                })
            }
            Ok(_) => self.cached_quote(symbol, "empty response").await,
            Err(e) => {
                warn!(symbol, error = %e, "quote fetch failed, trying cache");
                self.cached_quote(symbol, &e.to_string()).await
            }
        }
    }

    async fn cached_quote(&self, symbol: &str, cause: &str) -> Result<Quote, EngineError> {
        let cache = self.cache.read().await;
        match cache.get(symbol) {
            Some(&(price, timestamp)) => Ok(Quote {
                price,
                timestamp,
                stale: Utc::now() - timestamp > self.staleness,
            }),
            None => Err(EngineError::ProviderUnavailable(format!(
                "{} and no cached quote for {}",
                cause, symbol
            ))),
        }
    }

    /// Seed the quote cache directly. Used by the monitor after fills and
    /// by tests.
    pub async fn prime_cache(&self, symbol: &str, price: f64) {
        let mut cache = self.cache.write().await;
        cache.insert(symbol.to_string(), (price, Utc::now()));
    }

    /// Cheap reachability probe for pre-market health checks.
    pub async fn health_check(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .get(format!("{}/api/v4/data", self.base_url))
            .send()
            .await
            .map_err(|e| EngineError::ProviderUnavailable(e.to_string()))?;
        if response.status().is_server_error() {
            return Err(EngineError::ProviderUnavailable(format!(
                "provider health check failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
