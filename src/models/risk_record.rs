//! Audit record written whenever a risk limit fires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The limit that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskKind {
    StopLoss,
    TakeProfit,
    PositionLimit,
    OrderAmount,
    DailyCap,
    PriceSanity,
    LineExit,
}

impl RiskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskKind::StopLoss => "stop-loss",
            RiskKind::TakeProfit => "take-profit",
            RiskKind::PositionLimit => "position-limit",
            RiskKind::OrderAmount => "order-amount",
            RiskKind::DailyCap => "daily-cap",
            RiskKind::PriceSanity => "price-sanity",
            RiskKind::LineExit => "line-exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRecordStatus {
    Active,
    Resolved,
    Ignored,
}

impl RiskRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRecordStatus::Active => "active",
            RiskRecordStatus::Resolved => "resolved",
            RiskRecordStatus::Ignored => "ignored",
        }
    }
}

/// One breach event. Created active; resolved once the resulting action
/// (rejection recorded, close order filled) completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRecord {
    pub symbol: String,
    pub kind: RiskKind,

    /// Threshold that was crossed, in price or notional terms
    pub trigger_value: f64,

    /// Value actually observed
    pub observed_value: f64,

    /// Human-readable action taken (e.g., "order rejected", "close submitted")
    pub action: String,

    pub status: RiskRecordStatus,
    pub created_at: DateTime<Utc>,
}

impl RiskRecord {
    pub fn new(
        symbol: impl Into<String>,
        kind: RiskKind,
        trigger_value: f64,
        observed_value: f64,
        action: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            trigger_value,
            observed_value,
            action: action.into(),
            status: RiskRecordStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn resolve(&mut self) {
        self.status = RiskRecordStatus::Resolved;
    }
}
