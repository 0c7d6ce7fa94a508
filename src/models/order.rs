//! Order model, created only after risk approval of a triggered signal.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::{Direction, StrategyId};

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// Entry side for a signal direction. Long entries buy, short entries sell.
    pub fn entry_for(direction: Direction) -> Self {
        match direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Limit,
    Market,
}

impl PriceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceType::Limit => "limit",
            PriceType::Market => "market",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// An order bound for the execution gateway. Identity is fixed at creation
/// and never changes after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned order id
    pub id: String,

    pub symbol: String,
    pub side: OrderSide,

    /// Quantity in shares
    pub quantity: u32,

    /// Limit price, or the reference price for market orders
    pub price: Decimal,

    pub price_type: PriceType,

    /// Strategy that produced the originating signal, if any. Close orders
    /// synthesized by the risk manager carry the entry's strategy.
    pub strategy: Option<StrategyId>,

    pub submitted_at: DateTime<Utc>,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: u32,
        price: Decimal,
        strategy: Option<StrategyId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            price_type: PriceType::Limit,
            strategy,
            submitted_at: Utc::now(),
            status: OrderStatus::Pending,
        }
    }

    /// Order notional (price * quantity).
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Limit price as f64, for comparisons against monitored prices.
    pub fn price_f64(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.price.to_f64().unwrap_or(0.0)
    }
}

/// Convert an f64 price into the decimal domain, rounding to two places.
pub fn price_to_decimal(price: f64) -> Decimal {
    Decimal::from_f64(price)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_notional() {
        let order = Order::new("2330", OrderSide::Buy, 200, dec!(800), None);
        assert_eq!(order.notional(), dec!(160000));
    }

    #[test]
    fn test_entry_side() {
        assert_eq!(OrderSide::entry_for(Direction::Long), OrderSide::Buy);
        assert_eq!(OrderSide::entry_for(Direction::Short), OrderSide::Sell);
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn test_price_conversion_rounds() {
        assert_eq!(price_to_decimal(523.456), dec!(523.46));
        assert_eq!(price_to_decimal(0.0), dec!(0));
    }
}
