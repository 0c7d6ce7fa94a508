//! Position model representing current holdings in one symbol.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::{Direction, StrategyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::Closed => "closed",
        }
    }
}

/// An open or closed holding. Mutated only by fills; realized P&L is
/// computed when quantity returns to zero, never retroactively before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    /// Held quantity in shares
    pub quantity: u32,

    /// Average entry price
    pub average_price: Decimal,

    /// Last price seen by the monitor
    #[serde(default)]
    pub current_price: Decimal,

    /// Mark-to-market P&L on the open quantity
    #[serde(default)]
    pub unrealized_pnl: Decimal,

    /// P&L locked in by closing fills
    #[serde(default)]
    pub realized_pnl: Decimal,

    /// Long or short exposure
    pub direction: Direction,

    /// Strategy behind the entry, used for line-exit evaluation
    pub strategy: Option<StrategyId>,

    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,

    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(
        symbol: impl Into<String>,
        quantity: u32,
        price: Decimal,
        direction: Direction,
        strategy: Option<StrategyId>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            average_price: price,
            current_price: price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            direction,
            strategy,
            status: PositionStatus::Active,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Signed price delta in the position's favorable direction.
    fn favorable_delta(&self, price: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => price - self.average_price,
            Direction::Short => self.average_price - price,
        }
    }

    /// Update mark-to-market state from the latest monitored price.
    pub fn update_price(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = self.favorable_delta(price) * Decimal::from(self.quantity);
    }

    /// Add to the position, averaging the entry price in.
    pub fn add(&mut self, quantity: u32, price: Decimal) {
        let total_cost =
            self.average_price * Decimal::from(self.quantity) + price * Decimal::from(quantity);
        self.quantity += quantity;
        if self.quantity > 0 {
            self.average_price = total_cost / Decimal::from(self.quantity);
        }
        self.update_price(price);
    }

    /// Reduce the position by a closing fill, returning the realized P&L
    /// for the closed quantity. Closes the position at zero.
    pub fn reduce(&mut self, quantity: u32, price: Decimal) -> Decimal {
        let closed = quantity.min(self.quantity);
        let realized = self.favorable_delta(price) * Decimal::from(closed);

        self.quantity -= closed;
        self.realized_pnl += realized;
        self.update_price(price);

        if self.quantity == 0 {
            self.status = PositionStatus::Closed;
            self.closed_at = Some(Utc::now());
            self.unrealized_pnl = Decimal::ZERO;
        }
        realized
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Return as a fraction of entry cost, positive when in profit.
    pub fn return_pct(&self, price: Decimal) -> Decimal {
        if self.average_price.is_zero() {
            return Decimal::ZERO;
        }
        self.favorable_delta(price) / self.average_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_position(direction: Direction) -> Position {
        Position::new("2330", 1000, dec!(500), direction, Some(StrategyId::BlueLong))
    }

    #[test]
    fn test_long_pnl() {
        let mut pos = make_position(Direction::Long);
        pos.update_price(dec!(520));
        assert_eq!(pos.unrealized_pnl, dec!(20000));
        assert_eq!(pos.return_pct(dec!(520)), dec!(0.04));
    }

    #[test]
    fn test_short_pnl_inverts() {
        let mut pos = make_position(Direction::Short);
        pos.update_price(dec!(520));
        assert_eq!(pos.unrealized_pnl, dec!(-20000));
        pos.update_price(dec!(480));
        assert_eq!(pos.unrealized_pnl, dec!(20000));
    }

    #[test]
    fn test_full_close_realizes() {
        let mut pos = make_position(Direction::Long);
        let realized = pos.reduce(1000, dec!(540));
        assert_eq!(realized, dec!(40000));
        assert!(pos.is_closed());
        assert_eq!(pos.unrealized_pnl, dec!(0));
        assert_eq!(pos.realized_pnl, dec!(40000));
    }

    #[test]
    fn test_averaging_in() {
        let mut pos = make_position(Direction::Long);
        pos.add(1000, dec!(510));
        assert_eq!(pos.quantity, 2000);
        assert_eq!(pos.average_price, dec!(505));
    }
}
