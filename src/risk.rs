//! Risk manager.
//!
//! Gatekeeper between triggered signals and the execution gateway. Approval
//! checks and counter increments happen atomically under one lock so
//! concurrent triggers can never exceed the configured caps. The manager
//! also sweeps open positions each tick for stop-loss, take-profit, and
//! line-exit breaches, synthesizing close orders that follow the same
//! approval path as entries.

use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::{RiskConfig, TradingConfig};
use crate::models::{
    price_to_decimal, IndicatorSnapshot, Order, Position, RiskKind, RiskRecord, Signal,
};
use crate::models::{OrderSide, PositionStatus};
use crate::strategy;

/// The specific rule a rejected order violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    OrderAmountExceeded,
    PositionLimitExceeded,
    DailyCapExceeded,
    PriceSanityFailed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::OrderAmountExceeded => "order-amount-exceeded",
            RejectReason::PositionLimitExceeded => "position-limit-exceeded",
            RejectReason::DailyCapExceeded => "daily-cap-exceeded",
            RejectReason::PriceSanityFailed => "price-sanity-failed",
        }
    }

    fn kind(&self) -> RiskKind {
        match self {
            RejectReason::OrderAmountExceeded => RiskKind::OrderAmount,
            RejectReason::PositionLimitExceeded => RiskKind::PositionLimit,
            RejectReason::DailyCapExceeded => RiskKind::DailyCap,
            RejectReason::PriceSanityFailed => RiskKind::PriceSanity,
        }
    }
}

/// Session-scoped counters, reset when the orchestrator returns to idle.
#[derive(Debug, Default)]
struct SessionCounters {
    orders_today: u32,
    open_positions: usize,
    exposure: Decimal,
}

/// A close order synthesized by the position sweep.
#[derive(Debug)]
pub struct ExitOrder {
    pub order: Order,
    pub kind: RiskKind,
}

pub struct RiskManager {
    config: RiskConfig,
    counters: Mutex<SessionCounters>,
    records: Mutex<Vec<RiskRecord>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(SessionCounters::default()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Seed the open-position count from persisted cross-day state.
    pub fn set_open_positions(&self, count: usize) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.open_positions = count;
        }
    }

    /// Approve or reject a candidate order. On approval the daily order
    /// count, position count (for position-opening orders), and exposure
    /// are incremented before the lock is released.
    pub fn approve(
        &self,
        order: &Order,
        last_price: f64,
        opens_position: bool,
    ) -> Result<(), RejectReason> {
        let decision = self.check_and_reserve(order, last_price, opens_position);
        if let Err(reason) = decision {
            warn!(
                order_id = %order.id,
                symbol = %order.symbol,
                reason = reason.as_str(),
                "order rejected"
            );
            let mut record = RiskRecord::new(
                order.symbol.clone(),
                reason.kind(),
                self.threshold_for(reason),
                self.observed_for(reason, order, last_price),
                "order rejected",
            );
            record.resolve();
            self.record(record);
            return Err(reason);
        }
        info!(order_id = %order.id, symbol = %order.symbol, "order approved");
        Ok(())
    }

    fn check_and_reserve(
        &self,
        order: &Order,
        last_price: f64,
        opens_position: bool,
    ) -> Result<(), RejectReason> {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let notional = order.notional();
        if notional > self.config.max_order_amount {
            return Err(RejectReason::OrderAmountExceeded);
        }
        if counters.orders_today >= self.config.max_daily_orders {
            return Err(RejectReason::DailyCapExceeded);
        }
        if opens_position && counters.open_positions >= self.config.max_open_positions {
            return Err(RejectReason::PositionLimitExceeded);
        }
        if last_price > 0.0 {
            let order_price = order.price_f64();
            let drift = ((order_price - last_price) / last_price).abs();
            if drift > self.config.price_sanity_tolerance {
                return Err(RejectReason::PriceSanityFailed);
            }
        }

        counters.orders_today += 1;
        if opens_position {
            counters.open_positions += 1;
        }
        counters.exposure += notional;
        Ok(())
    }

    /// Release a reservation after the gateway rejected the order. The
    /// daily order count is deliberately not returned; a submission was
    /// consumed.
    pub fn release(&self, order: &Order, opened_position: bool) {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if opened_position && counters.open_positions > 0 {
            counters.open_positions -= 1;
        }
        counters.exposure -= order.notional();
    }

    /// A filled close order frees its position slot.
    pub fn position_closed(&self, order: &Order) {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if counters.open_positions > 0 {
            counters.open_positions -= 1;
        }
        counters.exposure -= order.notional();
    }

    pub fn orders_today(&self) -> u32 {
        match self.counters.lock() {
            Ok(guard) => guard.orders_today,
            Err(poisoned) => poisoned.into_inner().orders_today,
        }
    }

    /// Reset per-day counters on re-entry into idle. Open positions
    /// persist across days.
    pub fn reset_daily(&self) {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counters.orders_today = 0;
        counters.exposure = Decimal::ZERO;
    }

    fn record(&self, record: RiskRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Drain accumulated risk records for persistence.
    pub fn take_records(&self) -> Vec<RiskRecord> {
        match self.records.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn threshold_for(&self, reason: RejectReason) -> f64 {
        match reason {
            RejectReason::OrderAmountExceeded => {
                self.config.max_order_amount.to_f64().unwrap_or(0.0)
            }
            RejectReason::PositionLimitExceeded => self.config.max_open_positions as f64,
            RejectReason::DailyCapExceeded => self.config.max_daily_orders as f64,
            RejectReason::PriceSanityFailed => self.config.price_sanity_tolerance,
        }
    }

    fn observed_for(&self, reason: RejectReason, order: &Order, last_price: f64) -> f64 {
        match reason {
            RejectReason::OrderAmountExceeded => order.notional().to_f64().unwrap_or(0.0),
            RejectReason::PriceSanityFailed => last_price,
            _ => 0.0,
        }
    }

    /// Build the entry order for a triggered signal at the observed price.
    /// The strength-scaled quantity shrinks by whole lots until the notional
    /// fits under the per-order cap, never below one lot.
    pub fn entry_order(&self, signal: &Signal, observed_price: f64, trading: &TradingConfig) -> Order {
        let price = price_to_decimal(observed_price);
        let mut quantity = position_quantity(signal.strength, trading);
        while quantity > trading.lot_size
            && price * Decimal::from(quantity) > self.config.max_order_amount
        {
            quantity -= trading.lot_size;
        }
        Order::new(
            signal.symbol.clone(),
            OrderSide::entry_for(signal.direction),
            quantity,
            price,
            Some(signal.strategy),
        )
    }

    /// Sweep open positions against the latest prices and indicator
    /// history, synthesizing close orders for any breach. Stop-loss is
    /// checked before take-profit; the line exit applies only when the
    /// position still carries its entry strategy.
    pub fn check_exits(
        &self,
        positions: &[Position],
        prices: &HashMap<String, f64>,
        history: &HashMap<String, Vec<IndicatorSnapshot>>,
    ) -> Vec<ExitOrder> {
        let mut exits = Vec::new();
        for position in positions {
            if position.status != PositionStatus::Active {
                continue;
            }
            let Some(&price) = prices.get(&position.symbol) else {
                continue;
            };
            let ret = position
                .return_pct(price_to_decimal(price))
                .to_f64()
                .unwrap_or(0.0);

            let kind = if ret <= -self.config.stop_loss_pct {
                Some(RiskKind::StopLoss)
            } else if ret >= self.config.take_profit_pct {
                Some(RiskKind::TakeProfit)
            } else {
                position
                    .strategy
                    .filter(|&id| {
                        history
                            .get(&position.symbol)
                            .map(|snaps| {
                                strategy::exit_condition_met(id, snaps, self.config.exit_bars)
                            })
                            .unwrap_or(false)
                    })
                    .map(|_| RiskKind::LineExit)
            };

            let Some(kind) = kind else { continue };

            let side = OrderSide::entry_for(position.direction).opposite();
            let order = Order::new(
                position.symbol.clone(),
                side,
                position.quantity,
                price_to_decimal(price),
                position.strategy,
            );
            info!(
                symbol = %position.symbol,
                kind = kind.as_str(),
                return_pct = ret,
                "position exit triggered"
            );
            self.record(RiskRecord::new(
                position.symbol.clone(),
                kind,
                match kind {
                    RiskKind::StopLoss => -self.config.stop_loss_pct,
                    RiskKind::TakeProfit => self.config.take_profit_pct,
                    _ => 0.0,
                },
                ret,
                "close order submitted",
            ));
            exits.push(ExitOrder { order, kind });
        }
        exits
    }
}

/// Order quantity for a signal: the base quantity scaled by strength
/// (capped at 2x) and rounded down to a whole board lot, never below one
/// lot.
pub fn position_quantity(strength: f64, trading: &TradingConfig) -> u32 {
    let multiplier = (1.0 + strength.clamp(0.0, 1.0)).min(2.0);
    let raw = (trading.default_quantity as f64 * multiplier) as u32;
    let lots = (raw / trading.lot_size).max(1);
    lots * trading.lot_size
}
