//! Derived indicator snapshot, one per (symbol, timestamp).
//!
//! Snapshots are recomputable from price bars and never mutated after
//! creation; a recomputation supersedes the stored row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sign of the change in a moving average between consecutive bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slope {
    Up,
    Down,
    Flat,
}

impl Slope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slope::Up => "up",
            Slope::Down => "down",
            Slope::Flat => "flat",
        }
    }

    /// Sign of the delta between two consecutive average values.
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Slope::Up
        } else if delta < 0.0 {
            Slope::Down
        } else {
            Slope::Flat
        }
    }
}

/// Per-line readings: the average itself plus the derived ratios the
/// strategies test against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineValues {
    /// Simple moving average over the line's window
    pub value: f64,

    /// Sign of value[t] - value[t-1]; flat at the first computable bar
    pub slope: Slope,

    /// (close - value) / value
    pub deviation: f64,

    /// volume / trailing mean volume over the same window
    pub volume_ratio: f64,
}

/// MACD line, signal line, and histogram.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdValues {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Full indicator state for one symbol at one bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,

    /// Closing price of the source bar
    pub close: f64,

    /// Volume of the source bar
    pub volume: u64,

    /// Short-period line
    pub blue: LineValues,

    /// Medium-period line
    pub green: LineValues,

    /// Long-period line
    pub orange: LineValues,

    /// Wilder RSI; None until the smoothing period is filled
    pub rsi: Option<f64>,

    /// MACD 12/26/9; None until the slow EMA is seeded
    pub macd: Option<MacdValues>,

    /// Net count of bullish line relationships, in [-3, 3]
    pub trend_strength: i8,
}

impl IndicatorSnapshot {
    /// Number of lines the close currently sits above minus the number it
    /// sits below. +3 means price is above all three averages.
    pub fn compute_trend_strength(close: f64, blue: f64, green: f64, orange: f64) -> i8 {
        let mut strength: i8 = 0;
        for line in [blue, green, orange] {
            if close > line {
                strength += 1;
            } else if close < line {
                strength -= 1;
            }
        }
        strength
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slope_from_delta() {
        assert_eq!(Slope::from_delta(0.5), Slope::Up);
        assert_eq!(Slope::from_delta(-0.1), Slope::Down);
        assert_eq!(Slope::from_delta(0.0), Slope::Flat);
    }

    #[test]
    fn test_trend_strength_range() {
        assert_eq!(
            IndicatorSnapshot::compute_trend_strength(110.0, 100.0, 105.0, 108.0),
            3
        );
        assert_eq!(
            IndicatorSnapshot::compute_trend_strength(90.0, 100.0, 105.0, 108.0),
            -3
        );
        assert_eq!(
            IndicatorSnapshot::compute_trend_strength(106.0, 100.0, 105.0, 108.0),
            1
        );
    }
}
