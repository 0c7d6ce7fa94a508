//! Trading orchestrator.
//!
//! Top-level daily state machine sequencing pre-market preparation, signal
//! generation, session monitoring, and post-close reporting. Per-symbol
//! failures are isolated inside a phase; only gateway-fatal errors abort
//! the monitoring phase, and the next day's cycle proceeds regardless.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::api::{ExecutionGateway, QuoteClient};
use crate::config::{AppConfig, IndicatorConfig, SessionConfig, StrategyConfig};
use crate::db::Database;
use crate::error::{EngineError, ErrorKind};
use crate::indicators;
use crate::models::{IndicatorSnapshot, Position, PriceBar, Signal};
use crate::monitor::{PriceMonitor, SessionStats, TrackedSignal};
use crate::risk::RiskManager;
use crate::strategy::{self, filter};

/// Daily phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PreMarketPrep,
    SignalGeneration,
    SessionMonitoring,
    PostCloseReporting,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::PreMarketPrep => "pre_market_prep",
            Phase::SignalGeneration => "signal_generation",
            Phase::SessionMonitoring => "session_monitoring",
            Phase::PostCloseReporting => "post_close_reporting",
        }
    }

    /// Wall-clock transition function. Completed work phases advance
    /// unconditionally; time-gated transitions wait for their window.
    pub fn next(self, now: NaiveTime, session: &SessionConfig) -> Phase {
        match self {
            Phase::Idle => {
                if now >= session.prep_time && now < session.close_time {
                    Phase::PreMarketPrep
                } else {
                    Phase::Idle
                }
            }
            Phase::PreMarketPrep => Phase::SignalGeneration,
            Phase::SignalGeneration => {
                if now >= session.open_time {
                    Phase::SessionMonitoring
                } else {
                    Phase::SignalGeneration
                }
            }
            Phase::SessionMonitoring => {
                if now >= session.close_time {
                    Phase::PostCloseReporting
                } else {
                    Phase::SessionMonitoring
                }
            }
            Phase::PostCloseReporting => Phase::Idle,
        }
    }
}

/// Post-close summary, persisted as JSON and logged for the operator.
#[derive(Debug, Serialize, Deserialize)]
pub struct DailyReport {
    pub trade_date: String,
    pub signals_generated: u32,
    pub signals_triggered: u32,
    pub signals_executed: u32,
    pub signals_rejected: u32,
    pub signals_expired: u32,
    pub open_positions: usize,

    /// One entry per error kind, zero counts included
    pub error_counts: HashMap<String, u32>,
}

impl DailyReport {
    pub fn build(trade_date: String, stats: &SessionStats, open_positions: usize) -> Self {
        let observed = stats.error_counts();
        let mut error_counts = HashMap::new();
        for kind in ErrorKind::ALL {
            error_counts.insert(
                kind.as_str().to_string(),
                observed.get(&kind).copied().unwrap_or(0),
            );
        }
        Self {
            trade_date,
            signals_generated: stats.generated.load(Ordering::Relaxed),
            signals_triggered: stats.triggered.load(Ordering::Relaxed),
            signals_executed: stats.executed.load(Ordering::Relaxed),
            signals_rejected: stats.rejected.load(Ordering::Relaxed),
            signals_expired: stats.expired.load(Ordering::Relaxed),
            open_positions,
            error_counts,
        }
    }
}

impl fmt::Display for DailyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Daily report for {}", self.trade_date)?;
        writeln!(
            f,
            "  signals: {} generated, {} triggered, {} executed, {} rejected, {} expired",
            self.signals_generated,
            self.signals_triggered,
            self.signals_executed,
            self.signals_rejected,
            self.signals_expired
        )?;
        writeln!(f, "  open positions: {}", self.open_positions)?;
        let mut kinds: Vec<_> = self.error_counts.iter().collect();
        kinds.sort();
        for (kind, count) in kinds {
            writeln!(f, "  errors[{}]: {}", kind, count)?;
        }
        Ok(())
    }
}

/// Pure signal generation for one symbol's bar history: snapshots plus the
/// candidate signals from every enabled strategy on the latest snapshot.
pub fn generate_candidates(
    bars: &[PriceBar],
    indicator_config: &IndicatorConfig,
    strategy_config: &StrategyConfig,
) -> Result<(Vec<IndicatorSnapshot>, Vec<Signal>), EngineError> {
    let snapshots = indicators::compute_snapshots(bars, indicator_config)?;
    let Some((latest, history)) = snapshots.split_last() else {
        return Ok((snapshots, Vec::new()));
    };
    let window = strategy_config.slope_consistency_window;
    let start = history.len().saturating_sub(window);
    let signals = strategy::evaluate_all(latest, &history[start..], strategy_config, Utc::now());
    Ok((snapshots, signals))
}

pub struct Orchestrator {
    config: AppConfig,
    quotes: Arc<QuoteClient>,
    gateway: Arc<ExecutionGateway>,
    risk: Arc<RiskManager>,
    db: Arc<Database>,

    pending: Arc<RwLock<Vec<TrackedSignal>>>,
    positions: Arc<RwLock<Vec<Position>>>,
    history: Arc<RwLock<HashMap<String, Vec<IndicatorSnapshot>>>>,
    stats: Arc<SessionStats>,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        gateway: ExecutionGateway,
        db: Database,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let quotes = Arc::new(QuoteClient::new(
            config.quote_base_url.clone(),
            config.quote_staleness_secs,
            config.quote_retry_secs,
        )?);
        let risk = Arc::new(RiskManager::new(config.risk.clone()));
        Ok(Self {
            config,
            quotes,
            gateway: Arc::new(gateway),
            risk,
            db: Arc::new(db),
            pending: Arc::new(RwLock::new(Vec::new())),
            positions: Arc::new(RwLock::new(Vec::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(SessionStats::default()),
            shutdown,
        })
    }

    /// Run the daily cycle until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut phase = Phase::Idle;
        info!(simulated = self.gateway.is_simulated(), "orchestrator started");

        while !self.shutdown.load(Ordering::SeqCst) {
            let now = self.config.session.local_now();
            let next = phase.next(now, &self.config.session);
            if next == phase {
                // waiting on a time gate
                tokio::time::sleep(Duration::from_secs(30)).await;
                continue;
            }
            info!(from = phase.as_str(), to = next.as_str(), "phase transition");
            phase = next;

            match phase {
                Phase::Idle | Phase::PostCloseReporting => {}
                Phase::PreMarketPrep => {
                    if let Err(e) = self.pre_market_prep().await {
                        error!(error = %e, "pre-market prep failed, skipping today");
                        self.stats.record_error(e.kind());
                        phase = self.finish_day().await;
                    }
                }
                Phase::SignalGeneration => {
                    self.generate_signals().await;
                }
                Phase::SessionMonitoring => {
                    if let Err(e) = self.run_session().await {
                        // a fatal failure ends the phase, not the process
                        error!(error = %e, "session monitoring halted");
                        self.stats.record_error(e.kind());
                    }
                    phase = self.finish_day().await;
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        info!("orchestrator stopped");
        Ok(())
    }

    /// Enter post-close reporting: emit the report and release per-day
    /// state. Returns the phase the machine now sits in.
    async fn finish_day(&self) -> Phase {
        if let Err(e) = self.post_close_report().await {
            warn!(error = %e, "report persistence failed");
        }
        self.reset_session_state().await;
        Phase::PostCloseReporting
    }

    /// Health-check collaborators and restore cross-day position state.
    pub async fn pre_market_prep(&self) -> Result<(), EngineError> {
        self.quotes.health_check().await?;
        // the positions call doubles as the gateway reachability probe
        let broker_positions = self.gateway.get_positions().await?;
        debug!(broker_positions = broker_positions.len(), "gateway reachable");

        let open = self
            .db
            .get_open_positions()
            .await
            .map_err(|e| EngineError::ProviderUnavailable(e.to_string()))?;
        info!(open_positions = open.len(), "pre-market prep complete");
        self.risk.set_open_positions(open.len());
        *self.positions.write().await = open;
        Ok(())
    }

    /// Indicator computation, strategy evaluation, and filtering across the
    /// symbol universe. A failing symbol is logged, counted, and skipped.
    pub async fn generate_signals(&self) {
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(self.config.trading.history_days);

        let results = futures::future::join_all(self.config.trading.symbols.iter().map(
            |symbol| async move { (symbol.as_str(), self.generate_for_symbol(symbol, start, end).await) },
        ))
        .await;

        let mut candidates: Vec<Signal> = Vec::new();
        for (symbol, result) in results {
            match result {
                Ok(mut signals) => candidates.append(&mut signals),
                Err(e) => {
                    warn!(symbol, error = %e, "symbol skipped");
                    self.stats.record_error(e.kind());
                }
            }
        }

        let queue = filter::filter_and_rank(candidates, &self.config.filter);
        self.stats
            .generated
            .store(queue.len() as u32, Ordering::Relaxed);
        info!(signals = queue.len(), "signal queue ready");

        let mut pending = self.pending.write().await;
        pending.clear();
        for signal in queue {
            match self.db.save_signal(&signal).await {
                Ok(db_id) => pending.push(TrackedSignal { signal, db_id }),
                Err(e) => warn!(symbol = %signal.symbol, error = %e, "signal not persisted"),
            }
        }
    }

    async fn generate_for_symbol(
        &self,
        symbol: &str,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> Result<Vec<Signal>, EngineError> {
        let bars = self.quotes.get_price_history(symbol, start, end).await?;
        self.db.save_price_bars(&bars).await.ok();

        let (snapshots, signals) =
            generate_candidates(&bars, &self.config.indicators, &self.config.strategy)?;

        if let Some(latest) = snapshots.last() {
            self.db.save_snapshot(latest).await.ok();
        }

        // keep enough history around for line-exit evaluation
        let keep = self.config.risk.exit_bars.max(self.config.strategy.slope_consistency_window);
        let tail = snapshots[snapshots.len().saturating_sub(keep)..].to_vec();
        self.history.write().await.insert(symbol.to_string(), tail);

        Ok(signals)
    }

    async fn run_session(&self) -> Result<(), EngineError> {
        let monitor = PriceMonitor::new(
            self.config.monitor.clone(),
            self.config.session.clone(),
            self.config.trading.clone(),
            self.quotes.clone(),
            self.gateway.clone(),
            self.risk.clone(),
            self.db.clone(),
            self.pending.clone(),
            self.positions.clone(),
            self.history.clone(),
            self.stats.clone(),
            self.shutdown.clone(),
        );
        monitor.run().await
    }

    /// Emit and persist the daily summary, then flush risk records.
    pub async fn post_close_report(&self) -> Result<()> {
        let open = {
            let positions = self.positions.read().await;
            positions.iter().filter(|p| !p.is_closed()).count()
        };
        let trade_date = Utc::now().format("%Y-%m-%d").to_string();
        let report = DailyReport::build(trade_date.clone(), &self.stats, open);
        info!("\n{report}");

        let json = serde_json::to_string(&report).context("report serialization")?;
        self.db.save_daily_report(&trade_date, &json).await?;

        for record in self.risk.take_records() {
            self.db.save_risk_record(&record).await.ok();
        }
        Ok(())
    }

    /// Release session-scoped state on re-entry into idle. Open positions
    /// persist across days.
    async fn reset_session_state(&self) {
        self.pending.write().await.clear();
        self.history.write().await.clear();
        self.risk.reset_daily();
        self.stats.reset();
    }

    /// One-shot analysis pass for the CLI: prep plus signal generation,
    /// without entering the session loop.
    pub async fn analyze(&self) -> Result<Vec<Signal>> {
        self.pre_market_prep().await?;
        self.generate_signals().await;
        let pending = self.pending.read().await;
        Ok(pending.iter().map(|t| t.signal.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RiskConfig, TradingConfig};
    use crate::models::{Direction, SignalStatus, StrategyId};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn session() -> SessionConfig {
        SessionConfig::default()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_phase_transitions() {
        let s = session();
        assert_eq!(Phase::Idle.next(t(7, 0), &s), Phase::Idle);
        assert_eq!(Phase::Idle.next(t(8, 30), &s), Phase::PreMarketPrep);
        assert_eq!(Phase::PreMarketPrep.next(t(8, 31), &s), Phase::SignalGeneration);
        // signal generation waits for the open
        assert_eq!(Phase::SignalGeneration.next(t(8, 45), &s), Phase::SignalGeneration);
        assert_eq!(Phase::SignalGeneration.next(t(9, 0), &s), Phase::SessionMonitoring);
        assert_eq!(Phase::SessionMonitoring.next(t(11, 0), &s), Phase::SessionMonitoring);
        assert_eq!(Phase::SessionMonitoring.next(t(13, 30), &s), Phase::PostCloseReporting);
        assert_eq!(Phase::PostCloseReporting.next(t(13, 45), &s), Phase::Idle);
        // no prep after the close
        assert_eq!(Phase::Idle.next(t(14, 0), &s), Phase::Idle);
    }

    #[test]
    fn test_report_enumerates_every_error_kind() {
        let stats = SessionStats::default();
        stats.record_error(ErrorKind::InsufficientData);
        stats.record_error(ErrorKind::RiskRejected);
        stats.record_error(ErrorKind::RiskRejected);

        let report = DailyReport::build("2024-06-03".to_string(), &stats, 1);
        assert_eq!(report.error_counts.len(), ErrorKind::ALL.len());
        assert_eq!(report.error_counts["insufficient-data"], 1);
        assert_eq!(report.error_counts["risk-rejected"], 2);
        assert_eq!(report.error_counts["gateway-fatal"], 0);

        let rendered = report.to_string();
        assert!(rendered.contains("errors[risk-rejected]: 2"));
    }

    /// 130 daily bars in a steady uptrend with a volume burst over the
    /// last three bars. The close rides just above the blue line, while
    /// the green and orange lines lag too far below for a valid entry.
    fn breakout_bars() -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..130)
            .map(|i| {
                let close = 100.0 + 0.5 * i as f64;
                let volume = if i >= 127 { 4000 } else { 1000 };
                PriceBar::new(
                    "2330",
                    start + ChronoDuration::days(i),
                    close - 1.0,
                    close + 1.0,
                    close - 2.0,
                    close,
                    volume,
                )
            })
            .collect()
    }

    #[test]
    fn test_candidates_blue_long_breakout() {
        let (snapshots, signals) = generate_candidates(
            &breakout_bars(),
            &IndicatorConfig::default(),
            &StrategyConfig::default(),
        )
        .unwrap();
        assert!(!snapshots.is_empty());

        // green and orange lines are over-extended, only blue fires
        assert_eq!(signals.len(), 1);
        let blue_long = &signals[0];
        assert_eq!(blue_long.strategy, StrategyId::BlueLong);
        assert!(blue_long.strength > 0.6, "strength {}", blue_long.strength);
        assert_eq!(blue_long.trigger_price, 164.5);
        assert_eq!(blue_long.direction, Direction::Long);
    }

    #[tokio::test]
    async fn test_end_to_end_breakout_to_position() {
        use crate::api::SimulatedGateway;
        use crate::monitor::PriceMonitor;
        use std::sync::atomic::AtomicBool;

        // signal generation from crafted bars
        let (snapshots, signals) = generate_candidates(
            &breakout_bars(),
            &IndicatorConfig::default(),
            &StrategyConfig::default(),
        )
        .unwrap();
        let queue = filter::filter_and_rank(signals, &crate::config::FilterConfig::default());
        let blue_long = queue
            .iter()
            .find(|s| s.strategy == StrategyId::BlueLong)
            .expect("blue_long survives filtering")
            .clone();
        let expected_quantity =
            crate::risk::position_quantity(blue_long.strength, &TradingConfig::default());

        // wire a monitor with a simulated gateway and a primed quote
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let quotes = Arc::new(QuoteClient::new("http://localhost:1".to_string(), 300, 0).unwrap());
        let db_id = db.save_signal(&blue_long).await.unwrap();
        let pending = Arc::new(RwLock::new(vec![TrackedSignal {
            signal: blue_long.clone(),
            db_id,
        }]));
        let positions = Arc::new(RwLock::new(Vec::new()));
        let mut history = HashMap::new();
        history.insert("2330".to_string(), snapshots);
        let stats = Arc::new(SessionStats::default());

        let monitor = PriceMonitor::new(
            crate::config::MonitorConfig::default(),
            SessionConfig::default(),
            TradingConfig::default(),
            quotes.clone(),
            Arc::new(ExecutionGateway::Simulated(SimulatedGateway)),
            Arc::new(RiskManager::new(RiskConfig::default())),
            db,
            pending.clone(),
            positions.clone(),
            Arc::new(RwLock::new(history)),
            stats.clone(),
            Arc::new(AtomicBool::new(false)),
        );

        // the monitored price reaches the trigger band
        quotes.prime_cache("2330", blue_long.trigger_price).await;
        monitor.poll_once().await.unwrap();

        assert_eq!(pending.read().await[0].signal.status, SignalStatus::Executed);
        let positions = positions.read().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, expected_quantity);
        assert_eq!(positions[0].direction, Direction::Long);
    }
}
