//! The six-strategy set.
//!
//! Each variant is a pure evaluation keyed by (line, direction): no shared
//! state, no side effects, safe to run in any order or in parallel across
//! symbols.

pub mod filter;

use chrono::{DateTime, Utc};

use crate::config::StrategyConfig;
use crate::models::{Direction, IndicatorSnapshot, LineValues, MaLine, Signal, Slope, StrategyId};

impl StrategyConfig {
    pub fn enabled(&self, id: StrategyId) -> bool {
        match id {
            StrategyId::BlueLong => self.enable_blue_long,
            StrategyId::BlueShort => self.enable_blue_short,
            StrategyId::GreenLong => self.enable_green_long,
            StrategyId::GreenShort => self.enable_green_short,
            StrategyId::OrangeLong => self.enable_orange_long,
            StrategyId::OrangeShort => self.enable_orange_short,
        }
    }
}

fn line_of(snapshot: &IndicatorSnapshot, line: MaLine) -> &LineValues {
    match line {
        MaLine::Blue => &snapshot.blue,
        MaLine::Green => &snapshot.green,
        MaLine::Orange => &snapshot.orange,
    }
}

/// Entry gate for one variant on the latest snapshot. All four conditions
/// must hold; the mirror conditions apply on the short side.
fn entry_condition(id: StrategyId, snapshot: &IndicatorSnapshot, config: &StrategyConfig) -> bool {
    let line = line_of(snapshot, id.line());
    let dev = line.deviation;
    match id.direction() {
        Direction::Long => {
            snapshot.close > line.value
                && line.slope == Slope::Up
                && dev >= config.deviation_band_min
                && dev <= config.deviation_band_max
                && line.volume_ratio > config.volume_breakout_threshold
        }
        Direction::Short => {
            snapshot.close < line.value
                && line.slope == Slope::Down
                && dev <= -config.deviation_band_min
                && dev >= -config.deviation_band_max
                && line.volume_ratio > config.volume_breakout_threshold
        }
    }
}

/// Weighted strength score, clamped to [0, 1].
///
/// Deviation scores highest near the line and decays toward the band edge;
/// volume scores the ratio's excess over the breakout threshold; slope
/// scores the fraction of recent snapshots whose line slope agrees with the
/// trade direction.
fn strength_score(
    id: StrategyId,
    snapshot: &IndicatorSnapshot,
    history: &[IndicatorSnapshot],
    config: &StrategyConfig,
) -> f64 {
    let line = line_of(snapshot, id.line());

    let band_width = config.deviation_band_max - config.deviation_band_min;
    let dev_score = if band_width > 0.0 {
        (1.0 - (line.deviation.abs() - config.deviation_band_min) / band_width).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let threshold = config.volume_breakout_threshold;
    let vol_score = ((line.volume_ratio - threshold) / threshold).clamp(0.0, 1.0);

    let wanted = match id.direction() {
        Direction::Long => Slope::Up,
        Direction::Short => Slope::Down,
    };
    let window = config.slope_consistency_window;
    let recent: Vec<&IndicatorSnapshot> = history
        .iter()
        .rev()
        .take(window.saturating_sub(1))
        .chain(std::iter::once(snapshot))
        .collect();
    let consistent = recent
        .iter()
        .filter(|s| line_of(s, id.line()).slope == wanted)
        .count();
    let slope_score = consistent as f64 / recent.len().max(1) as f64;

    (config.weight_deviation * dev_score
        + config.weight_volume * vol_score
        + config.weight_slope * slope_score)
        .clamp(0.0, 1.0)
}

/// Evaluate one strategy against the latest snapshot plus a short history
/// window (most recent last, excluding the latest snapshot itself).
pub fn evaluate(
    id: StrategyId,
    snapshot: &IndicatorSnapshot,
    history: &[IndicatorSnapshot],
    config: &StrategyConfig,
    generated_at: DateTime<Utc>,
) -> Option<Signal> {
    if !config.enabled(id) || !entry_condition(id, snapshot, config) {
        return None;
    }
    let strength = strength_score(id, snapshot, history, config);
    Some(Signal::new(
        snapshot.symbol.clone(),
        id,
        strength,
        snapshot.close,
        generated_at,
    ))
}

/// Run every enabled strategy against the same snapshot.
pub fn evaluate_all(
    snapshot: &IndicatorSnapshot,
    history: &[IndicatorSnapshot],
    config: &StrategyConfig,
    generated_at: DateTime<Utc>,
) -> Vec<Signal> {
    StrategyId::ALL
        .iter()
        .filter_map(|&id| evaluate(id, snapshot, history, config, generated_at))
        .collect()
}

/// Exit test for an open position entered by `id`: true when the close has
/// failed the entry line for the last `exit_bars` snapshots in a row.
/// A long fails when it closes at or below the line, a short when it
/// recloses at or above it.
pub fn exit_condition_met(
    id: StrategyId,
    recent: &[IndicatorSnapshot],
    exit_bars: usize,
) -> bool {
    if recent.len() < exit_bars {
        return false;
    }
    recent[recent.len() - exit_bars..].iter().all(|snap| {
        let line = line_of(snap, id.line());
        match id.direction() {
            Direction::Long => snap.close <= line.value,
            Direction::Short => snap.close >= line.value,
        }
    })
}
