//! Engine configuration.
//!
//! Every knob the engine recognizes lives here, grouped by component, with
//! defaults matching the production setup for the Taiwan session. Validation
//! runs once at startup and fails fast before any phase begins.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Moving-average and oscillator periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Blue line (short) window in bars
    pub blue_period: usize,

    /// Green line (medium) window in bars
    pub green_period: usize,

    /// Orange line (long) window in bars
    pub orange_period: usize,

    /// RSI smoothing period (Wilder)
    pub rsi_period: usize,

    /// MACD fast EMA period
    pub macd_fast: usize,

    /// MACD slow EMA period
    pub macd_slow: usize,

    /// MACD signal EMA period
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            blue_period: 20,    // ~1 month of daily bars
            green_period: 60,   // ~1 quarter
            orange_period: 120, // ~half a year
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorConfig {
    /// The minimum number of bars needed before any snapshot is computable.
    pub fn longest_period(&self) -> usize {
        self.orange_period
            .max(self.green_period)
            .max(self.blue_period)
    }
}

/// Entry rules and strength scoring shared by the six strategy variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum deviation ratio from the line for a valid entry
    pub deviation_band_min: f64,

    /// Maximum deviation ratio; rejects over-extended entries
    pub deviation_band_max: f64,

    /// Volume ratio above which a move counts as a breakout
    pub volume_breakout_threshold: f64,

    /// Snapshots examined for slope consistency in the strength score
    pub slope_consistency_window: usize,

    /// Strength weight for deviation magnitude within the band
    pub weight_deviation: f64,

    /// Strength weight for volume-ratio excess over the threshold
    pub weight_volume: f64,

    /// Strength weight for slope consistency
    pub weight_slope: f64,

    /// Per-strategy enable flags
    pub enable_blue_long: bool,
    pub enable_blue_short: bool,
    pub enable_green_long: bool,
    pub enable_green_short: bool,
    pub enable_orange_long: bool,
    pub enable_orange_short: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            deviation_band_min: 0.0,
            deviation_band_max: 0.05, // reject entries stretched >5% from the line
            volume_breakout_threshold: 1.5,
            slope_consistency_window: 3,
            weight_deviation: 0.3,
            weight_volume: 0.3,
            weight_slope: 0.4,
            enable_blue_long: true,
            enable_blue_short: true,
            enable_green_long: true,
            enable_green_short: true,
            enable_orange_long: true,
            enable_orange_short: true,
        }
    }
}

/// Signal filtering and ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Signals below this strength are dropped
    pub min_signal_strength: f64,

    /// Survivors kept per symbol, highest strength first
    pub max_signals_per_symbol: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_signal_strength: 0.6,
            max_signals_per_symbol: 2,
        }
    }
}

/// Session-monitoring loop pacing and trigger matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Price polling interval (seconds)
    pub price_interval_secs: u64,

    /// Lightweight liveness-report interval (seconds)
    pub liveness_interval_secs: u64,

    /// Relative tolerance around a signal's trigger price
    pub trigger_tolerance: f64,

    /// Per-call timeout for gateway and quote requests (seconds)
    pub call_timeout_secs: u64,

    /// Consecutive gateway timeouts before escalating to fatal
    pub max_gateway_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            price_interval_secs: 60,
            liveness_interval_secs: 10,
            trigger_tolerance: 0.01, // 1%
            call_timeout_secs: 15,
            max_gateway_failures: 3,
        }
    }
}

/// Risk limits enforced before any order leaves the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum notional per order
    pub max_order_amount: Decimal,

    /// Maximum concurrently open positions
    pub max_open_positions: usize,

    /// Maximum orders submitted per day
    pub max_daily_orders: u32,

    /// Stop-loss as a fraction of entry price
    pub stop_loss_pct: f64,

    /// Take-profit as a fraction of entry price
    pub take_profit_pct: f64,

    /// Maximum relative gap between order price and last monitored price
    pub price_sanity_tolerance: f64,

    /// Consecutive bars failing the entry line before a position is exited
    pub exit_bars: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_order_amount: dec!(1000000), // TWD
            max_open_positions: 5,
            max_daily_orders: 10,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.08,
            price_sanity_tolerance: 0.03,
            exit_bars: 3,
        }
    }
}

/// Wall-clock windows for the daily phase machine (exchange local time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pre-market preparation start
    pub prep_time: NaiveTime,

    /// Continuous session open
    pub open_time: NaiveTime,

    /// Continuous session close
    pub close_time: NaiveTime,

    /// Exchange UTC offset in hours (Taipei is +8)
    pub utc_offset_hours: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prep_time: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            open_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
            utc_offset_hours: 8,
        }
    }
}

impl SessionConfig {
    /// Exchange-local wall-clock time for a UTC instant. Session windows
    /// are compared in this clock, never in UTC.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        match FixedOffset::east_opt(self.utc_offset_hours * 3600) {
            Some(offset) => instant.with_timezone(&offset).time(),
            None => instant.time(),
        }
    }

    pub fn local_now(&self) -> NaiveTime {
        self.local_time(Utc::now())
    }
}

/// Symbol universe and order sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Symbols analyzed and monitored each day
    pub symbols: Vec<String>,

    /// Base order quantity in shares, before strength scaling
    pub default_quantity: u32,

    /// Exchange board lot; quantities round down to a multiple of this
    pub lot_size: u32,

    /// Days of history fetched for indicator computation
    pub history_days: i64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["2330".to_string(), "0050".to_string(), "1101".to_string()],
            default_quantity: 1000,
            lot_size: 1000,
            history_days: 365,
        }
    }
}

/// Top-level configuration consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub indicators: IndicatorConfig,
    pub strategy: StrategyConfig,
    pub filter: FilterConfig,
    pub monitor: MonitorConfig,
    pub risk: RiskConfig,
    pub session: SessionConfig,
    pub trading: TradingConfig,

    /// Quote provider base URL
    pub quote_base_url: String,

    /// Quotes older than this are served flagged stale (seconds)
    pub quote_staleness_secs: i64,

    /// Retry budget for a latest-price fetch before degrading to the
    /// cached quote (seconds)
    pub quote_retry_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorConfig::default(),
            strategy: StrategyConfig::default(),
            filter: FilterConfig::default(),
            monitor: MonitorConfig::default(),
            risk: RiskConfig::default(),
            session: SessionConfig::default(),
            trading: TradingConfig::default(),
            quote_base_url: "https://api.finmindtrade.com".to_string(),
            quote_staleness_secs: 300,
            quote_retry_secs: 10,
        }
    }
}

impl AppConfig {
    /// Validate the full configuration, failing fast before any phase runs.
    pub fn validate(&self) -> Result<(), EngineError> {
        let ind = &self.indicators;
        if ind.blue_period == 0 || ind.green_period == 0 || ind.orange_period == 0 {
            return Err(EngineError::ConfigInvalid(
                "indicator periods must be positive".to_string(),
            ));
        }
        if !(ind.blue_period < ind.green_period && ind.green_period < ind.orange_period) {
            return Err(EngineError::ConfigInvalid(format!(
                "indicator periods must be strictly increasing: blue {} < green {} < orange {}",
                ind.blue_period, ind.green_period, ind.orange_period
            )));
        }
        if ind.macd_fast >= ind.macd_slow {
            return Err(EngineError::ConfigInvalid(format!(
                "macd fast period {} must be below slow period {}",
                ind.macd_fast, ind.macd_slow
            )));
        }

        let strat = &self.strategy;
        if strat.deviation_band_min >= strat.deviation_band_max {
            return Err(EngineError::ConfigInvalid(format!(
                "deviation band min {} must be below max {}",
                strat.deviation_band_min, strat.deviation_band_max
            )));
        }
        let weight_sum = strat.weight_deviation + strat.weight_volume + strat.weight_slope;
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(EngineError::ConfigInvalid(format!(
                "strength weights must sum to 1, got {}",
                weight_sum
            )));
        }
        if strat.volume_breakout_threshold <= 0.0 {
            return Err(EngineError::ConfigInvalid(
                "volume breakout threshold must be positive".to_string(),
            ));
        }
        if strat.slope_consistency_window == 0 {
            return Err(EngineError::ConfigInvalid(
                "slope consistency window must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.filter.min_signal_strength) {
            return Err(EngineError::ConfigInvalid(
                "minimum signal strength must be within [0, 1]".to_string(),
            ));
        }
        if self.filter.max_signals_per_symbol == 0 {
            return Err(EngineError::ConfigInvalid(
                "max signals per symbol must be positive".to_string(),
            ));
        }

        let mon = &self.monitor;
        if mon.price_interval_secs == 0 || mon.liveness_interval_secs == 0 {
            return Err(EngineError::ConfigInvalid(
                "polling intervals must be positive".to_string(),
            ));
        }
        if mon.trigger_tolerance <= 0.0 {
            return Err(EngineError::ConfigInvalid(
                "trigger tolerance must be positive".to_string(),
            ));
        }

        let risk = &self.risk;
        if risk.max_order_amount <= Decimal::ZERO {
            return Err(EngineError::ConfigInvalid(
                "max order amount must be positive".to_string(),
            ));
        }
        if risk.max_open_positions == 0 || risk.max_daily_orders == 0 {
            return Err(EngineError::ConfigInvalid(
                "position and daily order limits must be positive".to_string(),
            ));
        }
        if risk.stop_loss_pct <= 0.0 || risk.take_profit_pct <= 0.0 {
            return Err(EngineError::ConfigInvalid(
                "stop-loss and take-profit percentages must be positive".to_string(),
            ));
        }
        if risk.exit_bars == 0 {
            return Err(EngineError::ConfigInvalid(
                "exit bars must be positive".to_string(),
            ));
        }

        let sess = &self.session;
        if !(sess.prep_time < sess.open_time && sess.open_time < sess.close_time) {
            return Err(EngineError::ConfigInvalid(format!(
                "session times must be ordered: prep {} < open {} < close {}",
                sess.prep_time, sess.open_time, sess.close_time
            )));
        }
        if sess.utc_offset_hours.abs() >= 24 {
            return Err(EngineError::ConfigInvalid(format!(
                "utc offset {} hours is not a valid timezone offset",
                sess.utc_offset_hours
            )));
        }

        if self.trading.symbols.is_empty() {
            return Err(EngineError::ConfigInvalid(
                "symbol universe must not be empty".to_string(),
            ));
        }
        if self.trading.lot_size == 0 || self.trading.default_quantity == 0 {
            return Err(EngineError::ConfigInvalid(
                "lot size and default quantity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unordered_periods_rejected() {
        let mut config = AppConfig::default();
        config.indicators.green_period = 10; // below blue
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid(_)));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = AppConfig::default();
        config.strategy.weight_slope = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_order_enforced() {
        let mut config = AppConfig::default();
        config.session.open_time = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_clock_is_exchange_local() {
        use chrono::TimeZone;
        let session = SessionConfig::default();
        // 01:30 UTC is 09:30 in Taipei, inside the continuous session
        let instant = Utc.with_ymd_and_hms(2024, 6, 3, 1, 30, 0).unwrap();
        let local = session.local_time(instant);
        assert_eq!(local, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert!(local >= session.open_time && local < session.close_time);

        // 09:00 UTC is 17:00 in Taipei, after the close
        let instant = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        assert!(session.local_time(instant) >= session.close_time);
    }

    #[test]
    fn test_out_of_range_utc_offset_rejected() {
        let mut config = AppConfig::default();
        config.session.utc_offset_hours = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_universe_rejected() {
        let mut config = AppConfig::default();
        config.trading.symbols.clear();
        assert!(config.validate().is_err());
    }
}
