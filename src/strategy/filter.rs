//! Signal filter and ranker.
//!
//! Turns the day's unordered candidate set into the immutable queue the
//! price monitor consumes. Filtering is deterministic and idempotent.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::FilterConfig;
use crate::models::Signal;

/// Total order used both for per-symbol capping and final presentation:
/// strength descending, then generation time ascending, then strategy id.
fn rank(a: &Signal, b: &Signal) -> Ordering {
    b.strength
        .partial_cmp(&a.strength)
        .unwrap_or(Ordering::Equal)
        .then(a.generated_at.cmp(&b.generated_at))
        .then(a.strategy.as_str().cmp(b.strategy.as_str()))
}

/// Drop weak signals, cap survivors per symbol keeping the strongest, and
/// sort the result descending by strength.
pub fn filter_and_rank(signals: Vec<Signal>, config: &FilterConfig) -> Vec<Signal> {
    let mut kept: Vec<Signal> = signals
        .into_iter()
        .filter(|s| s.strength >= config.min_signal_strength)
        .collect();
    kept.sort_by(rank);

    let mut per_symbol: HashMap<String, usize> = HashMap::new();
    kept.retain(|s| {
        let count = per_symbol.entry(s.symbol.clone()).or_insert(0);
        *count += 1;
        *count <= config.max_signals_per_symbol
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategyId;
    use chrono::{Duration, TimeZone, Utc};

    fn make_signal(symbol: &str, strategy: StrategyId, strength: f64, offset: i64) -> Signal {
        let base = Utc.with_ymd_and_hms(2024, 6, 3, 1, 0, 0).unwrap();
        Signal::new(symbol, strategy, strength, 100.0, base + Duration::seconds(offset))
    }

    #[test]
    fn test_cap_keeps_top_two_of_five() {
        let config = FilterConfig {
            min_signal_strength: 0.6,
            max_signals_per_symbol: 2,
        };
        let signals = vec![
            make_signal("2330", StrategyId::BlueLong, 0.92, 0),
            make_signal("2330", StrategyId::GreenLong, 0.71, 1),
            make_signal("2330", StrategyId::OrangeLong, 0.85, 2),
            make_signal("2330", StrategyId::BlueShort, 0.64, 3),
            make_signal("2330", StrategyId::GreenShort, 0.78, 4),
        ];
        let out = filter_and_rank(signals, &config);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].strength, 0.92);
        assert_eq!(out[1].strength, 0.85);
    }

    #[test]
    fn test_threshold_drops_weak_signals() {
        let config = FilterConfig::default();
        let signals = vec![
            make_signal("2330", StrategyId::BlueLong, 0.59, 0),
            make_signal("0050", StrategyId::GreenLong, 0.60, 1),
        ];
        let out = filter_and_rank(signals, &config);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].symbol, "0050");
    }

    #[test]
    fn test_idempotent() {
        let config = FilterConfig::default();
        let signals = vec![
            make_signal("2330", StrategyId::BlueLong, 0.92, 0),
            make_signal("2330", StrategyId::GreenLong, 0.71, 1),
            make_signal("0050", StrategyId::OrangeLong, 0.85, 2),
            make_signal("0050", StrategyId::BlueShort, 0.64, 3),
            make_signal("1101", StrategyId::GreenShort, 0.78, 4),
        ];
        let once = filter_and_rank(signals, &config);
        let twice = filter_and_rank(once.clone(), &config);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert_eq!(a.symbol, b.symbol);
            assert_eq!(a.strategy, b.strategy);
            assert_eq!(a.strength, b.strength);
        }
    }

    #[test]
    fn test_tie_break_prefers_earlier_then_lexical() {
        let config = FilterConfig {
            min_signal_strength: 0.0,
            max_signals_per_symbol: 1,
        };
        // same strength and timestamp, blue_long sorts before green_long
        let signals = vec![
            make_signal("2330", StrategyId::GreenLong, 0.7, 0),
            make_signal("2330", StrategyId::BlueLong, 0.7, 0),
        ];
        let out = filter_and_rank(signals, &config);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strategy, StrategyId::BlueLong);

        // earlier generation wins over lexical order
        let signals = vec![
            make_signal("2330", StrategyId::GreenLong, 0.7, 0),
            make_signal("2330", StrategyId::BlueLong, 0.7, 5),
        ];
        let out = filter_and_rank(signals, &config);
        assert_eq!(out[0].strategy, StrategyId::GreenLong);
    }

    #[test]
    fn test_sorted_descending_across_symbols() {
        let config = FilterConfig::default();
        let signals = vec![
            make_signal("2330", StrategyId::BlueLong, 0.65, 0),
            make_signal("0050", StrategyId::GreenLong, 0.90, 1),
            make_signal("1101", StrategyId::OrangeLong, 0.75, 2),
        ];
        let out = filter_and_rank(signals, &config);
        let strengths: Vec<f64> = out.iter().map(|s| s.strength).collect();
        assert_eq!(strengths, vec![0.90, 0.75, 0.65]);
    }
}
