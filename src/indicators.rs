//! Indicator calculator.
//!
//! Pure transform from ordered price bars to indicator snapshots. Callers
//! persist the results; nothing here touches storage or the network.

use crate::config::IndicatorConfig;
use crate::error::EngineError;
use crate::models::{IndicatorSnapshot, LineValues, MacdValues, PriceBar, Slope};

/// Simple moving average series. Index i holds the mean of the trailing
/// `window` values ending at i, or None before the window fills.
fn sma_series(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = Some(sum / window as f64);
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values, per the standard MACD convention.
fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);
    let mut prev = seed;
    for i in period..values.len() {
        prev = values[i] * alpha + prev * (1.0 - alpha);
        out[i] = Some(prev);
    }
    out
}

/// Wilder RSI. None until the smoothing period is filled.
fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// MACD line, signal line, and histogram. None until the signal EMA seeds.
fn macd_series(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Vec<Option<MacdValues>> {
    let mut out = vec![None; closes.len()];
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .skip(slow.saturating_sub(1))
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => f - s,
            _ => 0.0,
        })
        .collect();
    let signal_ema = ema_series(&macd_line, signal);

    for (j, sig) in signal_ema.iter().enumerate() {
        if let Some(sig) = *sig {
            let i = j + slow - 1;
            let line = macd_line[j];
            out[i] = Some(MacdValues {
                line,
                signal: sig,
                histogram: line - sig,
            });
        }
    }
    out
}

/// Per-line readings at one index: average, slope against the prior bar's
/// average, deviation of the close, and windowed volume ratio.
fn line_values_at(
    i: usize,
    close: f64,
    avgs: &[Option<f64>],
    volumes: &[f64],
    vol_means: &[Option<f64>],
) -> Option<LineValues> {
    let value = avgs[i]?;
    let slope = match i.checked_sub(1).and_then(|p| avgs[p]) {
        Some(prev) => Slope::from_delta(value - prev),
        None => Slope::Flat,
    };
    let deviation = if value != 0.0 { (close - value) / value } else { 0.0 };
    let volume_ratio = match vol_means[i] {
        Some(mean) if mean > 0.0 => volumes[i] / mean,
        _ => 1.0,
    };
    Some(LineValues {
        value,
        slope,
        deviation,
        volume_ratio,
    })
}

/// Compute one snapshot per bar from the first index where all three
/// averages exist. Fewer bars than the longest window is an error and
/// yields no partial output.
pub fn compute_snapshots(
    bars: &[PriceBar],
    config: &IndicatorConfig,
) -> Result<Vec<IndicatorSnapshot>, EngineError> {
    let longest = config.longest_period();
    if bars.len() < longest {
        let symbol = bars.first().map(|b| b.symbol.clone()).unwrap_or_default();
        return Err(EngineError::InsufficientData {
            symbol,
            have: bars.len(),
            need: longest,
        });
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

    let blue = sma_series(&closes, config.blue_period);
    let green = sma_series(&closes, config.green_period);
    let orange = sma_series(&closes, config.orange_period);

    let blue_vol = sma_series(&volumes, config.blue_period);
    let green_vol = sma_series(&volumes, config.green_period);
    let orange_vol = sma_series(&volumes, config.orange_period);

    let rsi = rsi_series(&closes, config.rsi_period);
    let macd = macd_series(&closes, config.macd_fast, config.macd_slow, config.macd_signal);

    let mut snapshots = Vec::with_capacity(bars.len() - longest + 1);
    for i in (longest - 1)..bars.len() {
        let bar = &bars[i];
        let (blue_lv, green_lv, orange_lv) = match (
            line_values_at(i, bar.close, &blue, &volumes, &blue_vol),
            line_values_at(i, bar.close, &green, &volumes, &green_vol),
            line_values_at(i, bar.close, &orange, &volumes, &orange_vol),
        ) {
            (Some(b), Some(g), Some(o)) => (b, g, o),
            _ => continue,
        };

        let trend_strength = IndicatorSnapshot::compute_trend_strength(
            bar.close,
            blue_lv.value,
            green_lv.value,
            orange_lv.value,
        );

        snapshots.push(IndicatorSnapshot {
            symbol: bar.symbol.clone(),
            timestamp: bar.timestamp,
            close: bar.close,
            volume: bar.volume,
            blue: blue_lv,
            green: green_lv,
            orange: orange_lv,
            rsi: rsi[i],
            macd: macd[i],
            trend_strength,
        });
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn small_config() -> IndicatorConfig {
        IndicatorConfig {
            blue_period: 3,
            green_period: 5,
            orange_period: 8,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }

    fn make_bars(closes: &[f64], volumes: &[u64]) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| {
                PriceBar::new(
                    "2330",
                    start + Duration::days(i as i64),
                    close,
                    close + 1.0,
                    close - 1.0,
                    close,
                    volume,
                )
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data_yields_no_snapshots() {
        let bars = make_bars(&[100.0; 5], &[1000; 5]);
        let err = compute_snapshots(&bars, &small_config()).unwrap_err();
        match err {
            EngineError::InsufficientData { symbol, have, need } => {
                assert_eq!(symbol, "2330");
                assert_eq!(have, 5);
                assert_eq!(need, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_snapshot_count_and_first_slope_flat() {
        let closes: Vec<f64> = (1..=12).map(|i| 100.0 + i as f64).collect();
        let volumes = vec![1000u64; 12];
        let bars = make_bars(&closes, &volumes);
        let snaps = compute_snapshots(&bars, &small_config()).unwrap();

        // one per bar from index longest-1 onward
        assert_eq!(snaps.len(), 12 - 8 + 1);
        // the first snapshot has no prior orange average to compare against
        assert_eq!(snaps[0].orange.slope, Slope::Flat);
        // blue has history by then and the series rises steadily
        assert_eq!(snaps[0].blue.slope, Slope::Up);
        assert_eq!(snaps[1].orange.slope, Slope::Up);
    }

    #[test]
    fn test_deviation_and_volume_ratio() {
        // flat series with a volume spike on the final bar
        let mut volumes = vec![1000u64; 10];
        volumes[9] = 3000;
        let bars = make_bars(&[100.0; 10], &volumes);
        let snaps = compute_snapshots(&bars, &small_config()).unwrap();

        let last = snaps.last().unwrap();
        assert!(last.blue.deviation.abs() < 1e-9);
        // blue window is 3 bars: mean volume (1000+1000+3000)/3
        let expected = 3000.0 / ((1000.0 + 1000.0 + 3000.0) / 3.0);
        assert!((last.blue.volume_ratio - expected).abs() < 1e-9);
    }

    #[test]
    fn test_trend_strength_rising_series() {
        let closes: Vec<f64> = (1..=20).map(|i| 100.0 + i as f64 * 2.0).collect();
        let bars = make_bars(&closes, &vec![1000u64; 20]);
        let snaps = compute_snapshots(&bars, &small_config()).unwrap();
        // in a steady uptrend the close sits above all three averages
        assert_eq!(snaps.last().unwrap().trend_strength, 3);
    }

    #[test]
    fn test_rsi_bounds() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
        let bars = make_bars(&closes, &vec![1000u64; 40]);
        let snaps = compute_snapshots(&bars, &small_config()).unwrap();
        for snap in &snaps {
            if let Some(rsi) = snap.rsi {
                assert!((0.0..=100.0).contains(&rsi));
            }
        }
        // plenty of history, so the tail must have RSI and MACD
        assert!(snaps.last().unwrap().rsi.is_some());
        assert!(snaps.last().unwrap().macd.is_some());
    }
}
