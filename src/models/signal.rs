//! Trading signal model and the six-strategy identifier space.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

/// The three trend reference lines, short to long period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaLine {
    Blue,
    Green,
    Orange,
}

/// The closed set of strategy variants, one per (line, direction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    BlueLong,
    BlueShort,
    GreenLong,
    GreenShort,
    OrangeLong,
    OrangeShort,
}

impl StrategyId {
    pub const ALL: [StrategyId; 6] = [
        StrategyId::BlueLong,
        StrategyId::BlueShort,
        StrategyId::GreenLong,
        StrategyId::GreenShort,
        StrategyId::OrangeLong,
        StrategyId::OrangeShort,
    ];

    pub fn line(&self) -> MaLine {
        match self {
            StrategyId::BlueLong | StrategyId::BlueShort => MaLine::Blue,
            StrategyId::GreenLong | StrategyId::GreenShort => MaLine::Green,
            StrategyId::OrangeLong | StrategyId::OrangeShort => MaLine::Orange,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            StrategyId::BlueLong | StrategyId::GreenLong | StrategyId::OrangeLong => {
                Direction::Long
            }
            StrategyId::BlueShort | StrategyId::GreenShort | StrategyId::OrangeShort => {
                Direction::Short
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::BlueLong => "blue_long",
            StrategyId::BlueShort => "blue_short",
            StrategyId::GreenLong => "green_long",
            StrategyId::GreenShort => "green_short",
            StrategyId::OrangeLong => "orange_long",
            StrategyId::OrangeShort => "orange_short",
        }
    }
}

/// Lifecycle of a signal. Each terminal transition happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Triggered,
    Executed,
    Rejected,
    Expired,
    Cancelled,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Triggered => "triggered",
            SignalStatus::Executed => "executed",
            SignalStatus::Rejected => "rejected",
            SignalStatus::Expired => "expired",
            SignalStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignalStatus::Executed
                | SignalStatus::Rejected
                | SignalStatus::Expired
                | SignalStatus::Cancelled
        )
    }
}

/// A candidate trade produced by one strategy for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub strategy: StrategyId,
    pub direction: Direction,

    /// Confidence score in [0, 1]
    pub strength: f64,

    /// Price level at which the signal becomes actionable
    pub trigger_price: f64,

    pub generated_at: DateTime<Utc>,
    pub status: SignalStatus,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        strategy: StrategyId,
        strength: f64,
        trigger_price: f64,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy,
            direction: strategy.direction(),
            strength: strength.clamp(0.0, 1.0),
            trigger_price,
            generated_at,
            status: SignalStatus::Pending,
        }
    }

    /// True when the observed price sits within the relative tolerance band
    /// around the trigger price.
    pub fn matches_price(&self, observed: f64, tolerance: f64) -> bool {
        if self.trigger_price <= 0.0 {
            return false;
        }
        ((observed - self.trigger_price) / self.trigger_price).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_id_mapping() {
        assert_eq!(StrategyId::BlueLong.line(), MaLine::Blue);
        assert_eq!(StrategyId::BlueLong.direction(), Direction::Long);
        assert_eq!(StrategyId::OrangeShort.line(), MaLine::Orange);
        assert_eq!(StrategyId::OrangeShort.direction(), Direction::Short);
        assert_eq!(StrategyId::GreenShort.as_str(), "green_short");
    }

    #[test]
    fn test_strength_clamped() {
        let s = Signal::new("2330", StrategyId::BlueLong, 1.7, 525.0, Utc::now());
        assert_eq!(s.strength, 1.0);
        let s = Signal::new("2330", StrategyId::BlueShort, -0.2, 525.0, Utc::now());
        assert_eq!(s.strength, 0.0);
    }

    #[test]
    fn test_trigger_band_is_symmetric() {
        let s = Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now());
        // 1% band around 525.00 is [519.75, 530.25]
        assert!(s.matches_price(519.75, 0.01));
        assert!(s.matches_price(530.25, 0.01));
        assert!(s.matches_price(525.0, 0.01));
        assert!(!s.matches_price(515.0, 0.01));
        assert!(!s.matches_price(531.0, 0.01));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SignalStatus::Pending.is_terminal());
        assert!(!SignalStatus::Triggered.is_terminal());
        assert!(SignalStatus::Executed.is_terminal());
        assert!(SignalStatus::Expired.is_terminal());
    }
}
