//! Price monitor.
//!
//! Session-scoped polling loop that matches live prices against the day's
//! pending signals and drives the trigger, approval, and dispatch path.
//! Two periodic tasks share the pending set: the price tick owns every
//! status transition, the liveness tick only reads for reporting.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::{ExecutionGateway, OrderOutcome, QuoteClient};
use crate::config::{MonitorConfig, SessionConfig, TradingConfig};
use crate::db::Database;
use crate::error::{EngineError, ErrorKind};
use crate::models::{
    Direction, IndicatorSnapshot, Order, OrderSide, OrderStatus, Position, Signal, SignalStatus,
};
use crate::risk::RiskManager;

/// A pending signal paired with its database row.
#[derive(Debug, Clone)]
pub struct TrackedSignal {
    pub signal: Signal,
    pub db_id: i64,
}

/// Session tallies for the post-close report. Error counts are keyed by
/// the engine's error taxonomy.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub generated: AtomicU32,
    pub triggered: AtomicU32,
    pub executed: AtomicU32,
    pub rejected: AtomicU32,
    pub expired: AtomicU32,
    errors: std::sync::Mutex<HashMap<ErrorKind, u32>>,
}

impl SessionStats {
    pub fn record_error(&self, kind: ErrorKind) {
        if let Ok(mut errors) = self.errors.lock() {
            *errors.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn error_counts(&self) -> HashMap<ErrorKind, u32> {
        match self.errors.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Clear all tallies on re-entry into idle.
    pub fn reset(&self) {
        self.generated.store(0, Ordering::Relaxed);
        self.triggered.store(0, Ordering::Relaxed);
        self.executed.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.expired.store(0, Ordering::Relaxed);
        match self.errors.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

pub struct PriceMonitor {
    config: MonitorConfig,
    session: SessionConfig,
    trading: TradingConfig,
    quotes: Arc<QuoteClient>,
    gateway: Arc<ExecutionGateway>,
    risk: Arc<RiskManager>,
    db: Arc<Database>,

    /// The day's signal queue; only the price tick mutates it
    pending: Arc<RwLock<Vec<TrackedSignal>>>,

    /// Open positions, shared with the orchestrator
    positions: Arc<RwLock<Vec<Position>>>,

    /// Recent indicator history per symbol, for line-exit checks
    history: Arc<RwLock<HashMap<String, Vec<IndicatorSnapshot>>>>,

    stats: Arc<SessionStats>,
    shutdown: Arc<AtomicBool>,
    gateway_failures: AtomicU32,
}

impl PriceMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MonitorConfig,
        session: SessionConfig,
        trading: TradingConfig,
        quotes: Arc<QuoteClient>,
        gateway: Arc<ExecutionGateway>,
        risk: Arc<RiskManager>,
        db: Arc<Database>,
        pending: Arc<RwLock<Vec<TrackedSignal>>>,
        positions: Arc<RwLock<Vec<Position>>>,
        history: Arc<RwLock<HashMap<String, Vec<IndicatorSnapshot>>>>,
        stats: Arc<SessionStats>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            session,
            trading,
            quotes,
            gateway,
            risk,
            db,
            pending,
            positions,
            history,
            stats,
            shutdown,
            gateway_failures: AtomicU32::new(0),
        }
    }

    /// Run the monitoring loop until session close, shutdown, or a fatal
    /// gateway failure. Pending signals are expired before returning.
    pub async fn run(&self) -> Result<(), EngineError> {
        let mut price_tick = interval(Duration::from_secs(self.config.price_interval_secs));
        let mut liveness_tick = interval(Duration::from_secs(self.config.liveness_interval_secs));

        info!("session monitoring started");

        let result = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested, leaving session monitoring");
                break Ok(());
            }
            if self.session.local_now() >= self.session.close_time {
                info!("session closed");
                break Ok(());
            }

            tokio::select! {
                _ = price_tick.tick() => {
                    if let Err(e) = self.poll_once().await {
                        if matches!(e, EngineError::GatewayFatal(_)) {
                            error!(error = %e, "fatal gateway failure, halting session monitoring");
                            break Err(e);
                        }
                        warn!(error = %e, "poll tick failed");
                    }
                }
                _ = liveness_tick.tick() => {
                    self.report_liveness().await;
                }
            }
        };

        self.expire_remaining().await;
        result
    }

    /// Read-only heartbeat; never touches signal status.
    async fn report_liveness(&self) {
        let pending = self.pending.read().await;
        let waiting = pending
            .iter()
            .filter(|t| t.signal.status == SignalStatus::Pending)
            .count();
        debug!(
            pending = waiting,
            triggered = self.stats.triggered.load(Ordering::Relaxed),
            executed = self.stats.executed.load(Ordering::Relaxed),
            "monitor alive"
        );
    }

    /// One price tick: fetch quotes, evaluate triggers, dispatch approved
    /// orders, and sweep open positions for exits.
    pub async fn poll_once(&self) -> Result<(), EngineError> {
        let symbols = self.watched_symbols().await;
        if symbols.is_empty() {
            return Ok(());
        }

        let mut prices: HashMap<String, f64> = HashMap::new();
        for symbol in &symbols {
            match self.quotes.get_latest_price(symbol).await {
                Ok(quote) => {
                    if quote.stale {
                        warn!(symbol, "operating on stale quote");
                    }
                    prices.insert(symbol.clone(), quote.price);
                }
                Err(e) => {
                    // one symbol's outage never blocks the rest
                    warn!(symbol, error = %e, "no price available, skipping symbol");
                    self.stats.record_error(e.kind());
                }
            }
        }

        self.update_positions(&prices).await;
        self.check_triggers(&prices).await?;
        self.check_position_exits(&prices).await?;
        Ok(())
    }

    /// Symbols with at least one pending signal or an open position.
    async fn watched_symbols(&self) -> Vec<String> {
        let mut symbols = HashSet::new();
        {
            let pending = self.pending.read().await;
            for tracked in pending.iter() {
                if tracked.signal.status == SignalStatus::Pending {
                    symbols.insert(tracked.signal.symbol.clone());
                }
            }
        }
        {
            let positions = self.positions.read().await;
            for position in positions.iter() {
                if !position.is_closed() {
                    symbols.insert(position.symbol.clone());
                }
            }
        }
        symbols.into_iter().collect()
    }

    async fn update_positions(&self, prices: &HashMap<String, f64>) {
        let mut positions = self.positions.write().await;
        for position in positions.iter_mut() {
            if let Some(&price) = prices.get(&position.symbol) {
                position.update_price(crate::models::price_to_decimal(price));
            }
        }
    }

    /// Transition pending signals whose trigger condition holds and hand
    /// each to the risk manager exactly once.
    async fn check_triggers(&self, prices: &HashMap<String, f64>) -> Result<(), EngineError> {
        // collect trigger candidates under the lock, dispatch outside it
        let mut fired: Vec<(usize, f64)> = Vec::new();
        {
            let mut pending = self.pending.write().await;
            for (idx, tracked) in pending.iter_mut().enumerate() {
                if tracked.signal.status != SignalStatus::Pending {
                    continue;
                }
                let Some(&price) = prices.get(&tracked.signal.symbol) else {
                    continue;
                };
                if tracked.signal.matches_price(price, self.config.trigger_tolerance) {
                    tracked.signal.status = SignalStatus::Triggered;
                    fired.push((idx, price));
                }
            }
        }

        for (idx, price) in fired {
            let tracked = {
                let pending = self.pending.read().await;
                pending[idx].clone()
            };
            self.stats.triggered.fetch_add(1, Ordering::Relaxed);
            info!(
                symbol = %tracked.signal.symbol,
                strategy = tracked.signal.strategy.as_str(),
                price,
                "signal triggered"
            );
            self.db
                .update_signal_status(tracked.db_id, SignalStatus::Triggered)
                .await
                .ok();

            let status = self.dispatch(&tracked, price).await?;
            let mut pending = self.pending.write().await;
            pending[idx].signal.status = status;
        }
        Ok(())
    }

    /// Approval and gateway submission for one triggered signal. Returns
    /// the signal's terminal status; only gateway-fatal escalates.
    async fn dispatch(
        &self,
        tracked: &TrackedSignal,
        observed_price: f64,
    ) -> Result<SignalStatus, EngineError> {
        let order = self
            .risk
            .entry_order(&tracked.signal, observed_price, &self.trading);

        // a fill that averages into an existing leg consumes no position slot
        let opens_position = {
            let positions = self.positions.read().await;
            !positions.iter().any(|p| {
                p.symbol == tracked.signal.symbol
                    && p.direction == tracked.signal.direction
                    && !p.is_closed()
            })
        };

        if let Err(reason) = self.risk.approve(&order, observed_price, opens_position) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            self.stats.record_error(ErrorKind::RiskRejected);
            self.db
                .update_signal_status(tracked.db_id, SignalStatus::Rejected)
                .await
                .ok();
            info!(
                symbol = %tracked.signal.symbol,
                reason = reason.as_str(),
                "signal rejected by risk manager"
            );
            return Ok(SignalStatus::Rejected);
        }

        self.db.save_order(&order).await.ok();

        match self.submit_with_retry(&order, observed_price).await {
            Ok(OrderOutcome::Filled {
                gateway_order_id,
                price,
                quantity,
            }) => {
                self.gateway_failures.store(0, Ordering::SeqCst);
                self.db
                    .update_order_status(&order.id, OrderStatus::Filled.as_str(), Some(&gateway_order_id))
                    .await
                    .ok();
                self.open_position(&tracked.signal, quantity, price).await;
                self.db
                    .update_signal_status(tracked.db_id, SignalStatus::Executed)
                    .await
                    .ok();
                self.stats.executed.fetch_add(1, Ordering::Relaxed);
                info!(
                    symbol = %tracked.signal.symbol,
                    %gateway_order_id,
                    %price,
                    quantity,
                    "order filled"
                );
                Ok(SignalStatus::Executed)
            }
            Ok(OrderOutcome::Rejected { reason }) => {
                self.gateway_failures.store(0, Ordering::SeqCst);
                self.risk.release(&order, opens_position);
                self.db
                    .update_order_status(&order.id, OrderStatus::Rejected.as_str(), None)
                    .await
                    .ok();
                self.db
                    .update_signal_status(tracked.db_id, SignalStatus::Rejected)
                    .await
                    .ok();
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(symbol = %tracked.signal.symbol, reason, "gateway rejected order");
                Ok(SignalStatus::Rejected)
            }
            Err(e) => {
                self.risk.release(&order, opens_position);
                self.db
                    .update_order_status(&order.id, OrderStatus::Rejected.as_str(), None)
                    .await
                    .ok();
                self.db
                    .update_signal_status(tracked.db_id, SignalStatus::Rejected)
                    .await
                    .ok();
                self.stats.record_error(e.kind());
                if matches!(e, EngineError::GatewayFatal(_)) {
                    return Err(e);
                }
                warn!(symbol = %tracked.signal.symbol, error = %e, "order submission failed");
                Ok(SignalStatus::Rejected)
            }
        }
    }

    /// Submit with a per-call timeout and bounded retries. Consecutive
    /// timeouts past the configured limit escalate to gateway-fatal.
    async fn submit_with_retry(
        &self,
        order: &Order,
        last_price: f64,
    ) -> Result<OrderOutcome, EngineError> {
        let timeout = Duration::from_secs(self.config.call_timeout_secs);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let call = tokio::time::timeout(timeout, self.gateway.submit_order(order, last_price));
            let outcome = match call.await {
                Ok(result) => result,
                Err(_) => Err(EngineError::GatewayTimeout(format!(
                    "order {} submission timed out",
                    order.id
                ))),
            };

            match outcome {
                Err(e) if e.is_transient() => {
                    let failures = self.gateway_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures >= self.config.max_gateway_failures {
                        return Err(EngineError::GatewayFatal(format!(
                            "{} consecutive gateway failures: {}",
                            failures, e
                        )));
                    }
                    if attempt >= self.config.max_gateway_failures {
                        return Err(e);
                    }
                    warn!(order_id = %order.id, attempt, error = %e, "retrying order submission");
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                other => return other,
            }
        }
    }

    /// Record a fill: average into an existing open position on the same
    /// side, or open a new one.
    async fn open_position(&self, signal: &Signal, quantity: u32, price: Decimal) {
        let mut positions = self.positions.write().await;
        if let Some(existing) = positions.iter_mut().find(|p| {
            p.symbol == signal.symbol && p.direction == signal.direction && !p.is_closed()
        }) {
            existing.add(quantity, price);
            self.db.save_position(existing).await.ok();
            return;
        }
        let position = Position::new(
            signal.symbol.clone(),
            quantity,
            price,
            signal.direction,
            Some(signal.strategy),
        );
        self.db.save_position(&position).await.ok();
        positions.push(position);
    }

    /// Stop-loss, take-profit, and line-exit sweep. Close orders follow
    /// the same approval and dispatch path as entries.
    async fn check_position_exits(
        &self,
        prices: &HashMap<String, f64>,
    ) -> Result<(), EngineError> {
        let exits = {
            let positions = self.positions.read().await;
            let history = self.history.read().await;
            self.risk.check_exits(&positions, prices, &history)
        };

        for exit in exits {
            // exits never open a position, so the position cap does not apply
            if let Err(reason) = self.risk.approve(&exit.order, exit.order.price_f64(), false) {
                warn!(
                    symbol = %exit.order.symbol,
                    reason = reason.as_str(),
                    "exit order rejected, position stays open"
                );
                self.stats.record_error(ErrorKind::RiskRejected);
                continue;
            }
            self.db.save_order(&exit.order).await.ok();

            match self
                .submit_with_retry(&exit.order, exit.order.price_f64())
                .await
            {
                Ok(OrderOutcome::Filled {
                    gateway_order_id,
                    price,
                    quantity,
                }) => {
                    self.db
                        .update_order_status(
                            &exit.order.id,
                            OrderStatus::Filled.as_str(),
                            Some(&gateway_order_id),
                        )
                        .await
                        .ok();
                    // a sell closes the long leg, a buy closes the short leg
                    let direction = match exit.order.side {
                        OrderSide::Sell => Direction::Long,
                        OrderSide::Buy => Direction::Short,
                    };
                    self.close_position(&exit.order.symbol, direction, quantity, price)
                        .await;
                    self.risk.position_closed(&exit.order);
                    info!(
                        symbol = %exit.order.symbol,
                        kind = exit.kind.as_str(),
                        %price,
                        "position closed"
                    );
                }
                Ok(OrderOutcome::Rejected { reason }) => {
                    self.risk.release(&exit.order, false);
                    self.db
                        .update_order_status(&exit.order.id, OrderStatus::Rejected.as_str(), None)
                        .await
                        .ok();
                    warn!(symbol = %exit.order.symbol, reason, "close order rejected");
                }
                Err(e) => {
                    self.risk.release(&exit.order, false);
                    self.stats.record_error(e.kind());
                    if matches!(e, EngineError::GatewayFatal(_)) {
                        return Err(e);
                    }
                    warn!(symbol = %exit.order.symbol, error = %e, "close order failed");
                }
            }
        }
        Ok(())
    }

    async fn close_position(
        &self,
        symbol: &str,
        direction: Direction,
        quantity: u32,
        price: Decimal,
    ) {
        let mut positions = self.positions.write().await;
        for position in positions.iter_mut() {
            if position.symbol == symbol
                && position.direction == direction
                && !position.is_closed()
            {
                position.reduce(quantity, price);
                self.db.save_position(position).await.ok();
                break;
            }
        }
    }

    /// Force every non-terminal signal to expired. Runs at session close
    /// and on shutdown, after in-flight submissions resolved.
    pub async fn expire_remaining(&self) {
        let mut pending = self.pending.write().await;
        for tracked in pending.iter_mut() {
            if !tracked.signal.status.is_terminal() {
                tracked.signal.status = SignalStatus::Expired;
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                self.db
                    .update_signal_status(tracked.db_id, SignalStatus::Expired)
                    .await
                    .ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SimulatedGateway;
    use crate::config::RiskConfig;
    use crate::models::StrategyId;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct Harness {
        monitor: PriceMonitor,
        pending: Arc<RwLock<Vec<TrackedSignal>>>,
        positions: Arc<RwLock<Vec<Position>>>,
        stats: Arc<SessionStats>,
    }

    async fn harness(risk_config: RiskConfig) -> Harness {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let quotes = Arc::new(QuoteClient::new("http://localhost:1".to_string(), 300, 0).unwrap());
        let gateway = Arc::new(ExecutionGateway::Simulated(SimulatedGateway));
        let risk = Arc::new(RiskManager::new(risk_config));
        let pending = Arc::new(RwLock::new(Vec::new()));
        let positions = Arc::new(RwLock::new(Vec::new()));
        let history = Arc::new(RwLock::new(HashMap::new()));
        let stats = Arc::new(SessionStats::default());

        let monitor = PriceMonitor::new(
            MonitorConfig::default(),
            SessionConfig::default(),
            TradingConfig::default(),
            quotes,
            gateway,
            risk,
            db,
            pending.clone(),
            positions.clone(),
            history,
            stats.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        Harness {
            monitor,
            pending,
            positions,
            stats,
        }
    }

    async fn track(h: &Harness, signal: Signal) {
        let db_id = h.monitor.db.save_signal(&signal).await.unwrap();
        h.pending.write().await.push(TrackedSignal { signal, db_id });
    }

    #[tokio::test]
    async fn test_trigger_fires_once_and_executes() {
        let h = harness(RiskConfig::default()).await;
        let signal = Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now());
        track(&h, signal).await;
        h.monitor.quotes.prime_cache("2330", 524.0).await;

        h.monitor.poll_once().await.unwrap();
        assert_eq!(h.stats.triggered.load(Ordering::Relaxed), 1);
        assert_eq!(h.stats.executed.load(Ordering::Relaxed), 1);
        assert_eq!(
            h.pending.read().await[0].signal.status,
            SignalStatus::Executed
        );

        // a filled signal never re-triggers
        h.monitor.poll_once().await.unwrap();
        assert_eq!(h.stats.triggered.load(Ordering::Relaxed), 1);
        assert_eq!(h.stats.executed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_price_outside_band_does_not_trigger() {
        let h = harness(RiskConfig::default()).await;
        let signal = Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now());
        track(&h, signal).await;
        // 515 is outside the 1% band [519.75, 530.25]
        h.monitor.quotes.prime_cache("2330", 515.0).await;

        h.monitor.poll_once().await.unwrap();
        assert_eq!(h.stats.triggered.load(Ordering::Relaxed), 0);
        assert_eq!(
            h.pending.read().await[0].signal.status,
            SignalStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_risk_rejection_is_permanent() {
        let h = harness(RiskConfig {
            max_order_amount: dec!(1000), // everything rejects
            ..RiskConfig::default()
        })
        .await;
        let signal = Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now());
        track(&h, signal).await;
        h.monitor.quotes.prime_cache("2330", 525.0).await;

        h.monitor.poll_once().await.unwrap();
        assert_eq!(
            h.pending.read().await[0].signal.status,
            SignalStatus::Rejected
        );
        let errors = h.stats.error_counts();
        assert_eq!(errors.get(&ErrorKind::RiskRejected), Some(&1));

        // no re-trigger on later ticks
        h.monitor.poll_once().await.unwrap();
        assert_eq!(h.stats.triggered.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fill_opens_position_with_order_quantity() {
        let h = harness(RiskConfig::default()).await;
        let signal = Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now());
        track(&h, signal).await;
        h.monitor.quotes.prime_cache("2330", 525.0).await;

        h.monitor.poll_once().await.unwrap();
        let positions = h.positions.read().await;
        assert_eq!(positions.len(), 1);
        // strength 0.8 scales the 1000-share base by 1.8, rounded to the lot
        assert_eq!(positions[0].quantity, 1000);
        assert_eq!(positions[0].average_price, dec!(525));
        assert_eq!(positions[0].strategy, Some(StrategyId::BlueLong));
    }

    #[tokio::test]
    async fn test_averaging_fill_keeps_position_slot() {
        let h = harness(RiskConfig {
            max_open_positions: 2,
            ..RiskConfig::default()
        })
        .await;
        track(
            &h,
            Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now()),
        )
        .await;
        track(
            &h,
            Signal::new("2330", StrategyId::GreenLong, 0.8, 525.0, Utc::now()),
        )
        .await;
        track(
            &h,
            Signal::new("0050", StrategyId::BlueLong, 0.8, 180.0, Utc::now()),
        )
        .await;
        h.monitor.quotes.prime_cache("2330", 525.0).await;
        h.monitor.quotes.prime_cache("0050", 180.0).await;

        h.monitor.poll_once().await.unwrap();
        // the second 2330 fill averages in, so only one slot is consumed
        // and the 0050 entry still fits under the two-position cap
        let pending = h.pending.read().await;
        assert!(pending
            .iter()
            .all(|t| t.signal.status == SignalStatus::Executed));
        let positions = h.positions.read().await;
        assert_eq!(positions.len(), 2);
        let averaged = positions.iter().find(|p| p.symbol == "2330").unwrap();
        assert_eq!(averaged.quantity, 2000);
    }

    #[tokio::test]
    async fn test_exit_closes_matching_direction_leg() {
        let h = harness(RiskConfig::default()).await;
        {
            let mut positions = h.positions.write().await;
            positions.push(Position::new(
                "2330",
                1000,
                dec!(500),
                crate::models::Direction::Short,
                Some(StrategyId::BlueShort),
            ));
            positions.push(Position::new(
                "2330",
                1000,
                dec!(500),
                crate::models::Direction::Long,
                Some(StrategyId::BlueLong),
            ));
        }
        // down 6%: the long hits its stop, the short is merely in profit
        h.monitor.quotes.prime_cache("2330", 470.0).await;

        h.monitor.poll_once().await.unwrap();
        let positions = h.positions.read().await;
        assert!(!positions[0].is_closed());
        assert!(positions[1].is_closed());
        assert_eq!(positions[1].realized_pnl, dec!(-30000));
    }

    #[tokio::test]
    async fn test_expire_remaining() {
        let h = harness(RiskConfig::default()).await;
        track(
            &h,
            Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now()),
        )
        .await;
        track(
            &h,
            Signal::new("0050", StrategyId::GreenLong, 0.7, 180.0, Utc::now()),
        )
        .await;

        h.monitor.expire_remaining().await;
        let pending = h.pending.read().await;
        assert!(pending
            .iter()
            .all(|t| t.signal.status == SignalStatus::Expired));
        assert_eq!(h.stats.expired.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_stop_loss_closes_position() {
        let h = harness(RiskConfig::default()).await;
        h.positions.write().await.push(Position::new(
            "2330",
            1000,
            dec!(500),
            crate::models::Direction::Long,
            Some(StrategyId::BlueLong),
        ));
        // down 6%, past the 5% stop
        h.monitor.quotes.prime_cache("2330", 470.0).await;

        h.monitor.poll_once().await.unwrap();
        let positions = h.positions.read().await;
        assert!(positions[0].is_closed());
        assert_eq!(positions[0].realized_pnl, dec!(-30000));
    }
}
