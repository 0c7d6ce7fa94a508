//! Price bar model, the raw input to all indicator computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregation period of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarPeriod {
    Daily,
    Hourly,
    Minute,
}

impl BarPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarPeriod::Daily => "daily",
            BarPeriod::Hourly => "hourly",
            BarPeriod::Minute => "minute",
        }
    }
}

/// One OHLCV bar for a symbol. Immutable once stored, ordered by
/// (symbol, timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    /// Exchange symbol (e.g., "2330")
    pub symbol: String,

    /// Bar open time
    pub timestamp: DateTime<Utc>,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Traded volume in shares
    pub volume: u64,

    /// Aggregation period
    pub period: BarPeriod,
}

impl PriceBar {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            period: BarPeriod::Daily,
        }
    }
}
