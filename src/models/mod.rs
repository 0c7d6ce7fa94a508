//! Data models for bars, indicator snapshots, signals, orders, positions,
//! and risk records.

mod bar;
mod order;
mod position;
mod risk_record;
mod signal;
mod snapshot;

pub use bar::{BarPeriod, PriceBar};
pub use order::{price_to_decimal, Order, OrderSide, OrderStatus, PriceType};
pub use position::{Position, PositionStatus};
pub use risk_record::{RiskKind, RiskRecord, RiskRecordStatus};
pub use signal::{Direction, MaLine, Signal, SignalStatus, StrategyId};
pub use snapshot::{IndicatorSnapshot, LineValues, MacdValues, Slope};
