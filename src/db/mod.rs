//! Database persistence for the signal engine.
//!
//! Stores everything needed to resume after restart:
//! - Price bars and derived indicator snapshots
//! - Signals and their lifecycle transitions
//! - Orders, positions, and risk records
//! - Daily post-close reports
//!
//! Time-series tables carry (symbol, timestamp) uniqueness; recomputed
//! snapshots replace the stored row.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::str::FromStr;

use crate::models::{
    Direction, IndicatorSnapshot, Order, Position, PositionStatus, PriceBar, RiskRecord, Signal,
    SignalStatus, StrategyId,
};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored position row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredPosition {
    pub id: i64,
    pub symbol: String,
    pub quantity: i64,
    pub average_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub direction: String,
    pub strategy: Option<String>,
    pub status: String,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

impl StoredPosition {
    /// Rebuild the in-memory model from the stored row.
    pub fn into_model(self) -> Position {
        Position {
            symbol: self.symbol,
            quantity: self.quantity.max(0) as u32,
            average_price: Decimal::from_f64(self.average_price).unwrap_or(Decimal::ZERO),
            current_price: Decimal::from_f64(self.current_price).unwrap_or(Decimal::ZERO),
            unrealized_pnl: Decimal::from_f64(self.unrealized_pnl).unwrap_or(Decimal::ZERO),
            realized_pnl: Decimal::from_f64(self.realized_pnl).unwrap_or(Decimal::ZERO),
            direction: if self.direction == "short" {
                Direction::Short
            } else {
                Direction::Long
            },
            strategy: self.strategy.as_deref().and_then(parse_strategy),
            status: if self.status == "closed" {
                PositionStatus::Closed
            } else {
                PositionStatus::Active
            },
            opened_at: parse_timestamp(&self.opened_at),
            closed_at: self.closed_at.as_deref().map(parse_timestamp),
        }
    }
}

fn parse_strategy(s: &str) -> Option<StrategyId> {
    StrategyId::ALL.into_iter().find(|id| id.as_str() == s)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::from_str(s).unwrap_or_else(|_| Utc::now())
}

impl Database {
    /// Create a new database connection and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_bars (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                period TEXT NOT NULL DEFAULT 'daily',
                UNIQUE(symbol, timestamp, period)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indicator_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                close REAL NOT NULL,
                blue_value REAL NOT NULL,
                blue_slope TEXT NOT NULL,
                blue_deviation REAL NOT NULL,
                blue_volume_ratio REAL NOT NULL,
                green_value REAL NOT NULL,
                green_slope TEXT NOT NULL,
                green_deviation REAL NOT NULL,
                green_volume_ratio REAL NOT NULL,
                orange_value REAL NOT NULL,
                orange_slope TEXT NOT NULL,
                orange_deviation REAL NOT NULL,
                orange_volume_ratio REAL NOT NULL,
                rsi REAL,
                macd_line REAL,
                macd_signal REAL,
                macd_histogram REAL,
                trend_strength INTEGER NOT NULL DEFAULT 0,
                UNIQUE(symbol, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL,
                direction TEXT NOT NULL,
                strength REAL NOT NULL,
                trigger_price REAL NOT NULL,
                generated_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price REAL NOT NULL,
                price_type TEXT NOT NULL DEFAULT 'limit',
                strategy TEXT,
                gateway_order_id TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                submitted_at TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                average_price REAL NOT NULL,
                current_price REAL NOT NULL DEFAULT 0,
                unrealized_pnl REAL NOT NULL DEFAULT 0,
                realized_pnl REAL NOT NULL DEFAULT 0,
                direction TEXT NOT NULL DEFAULT 'long',
                strategy TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                UNIQUE(symbol, direction, opened_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                trigger_value REAL NOT NULL,
                observed_value REAL NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_reports (
                trade_date TEXT PRIMARY KEY,
                report TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bars_symbol_time ON price_bars(symbol, timestamp)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_symbol ON orders(symbol)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Price Bars ====================

    /// Save a batch of bars, ignoring duplicates.
    pub async fn save_price_bars(&self, bars: &[PriceBar]) -> Result<()> {
        for bar in bars {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO price_bars
                    (symbol, timestamp, open, high, low, close, volume, period)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&bar.symbol)
            .bind(bar.timestamp.to_rfc3339())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume as i64)
            .bind(bar.period.as_str())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ==================== Indicator Snapshots ====================

    /// Save a snapshot; a recomputation replaces the previous row.
    pub async fn save_snapshot(&self, snap: &IndicatorSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO indicator_snapshots (
                symbol, timestamp, close,
                blue_value, blue_slope, blue_deviation, blue_volume_ratio,
                green_value, green_slope, green_deviation, green_volume_ratio,
                orange_value, orange_slope, orange_deviation, orange_volume_ratio,
                rsi, macd_line, macd_signal, macd_histogram, trend_strength
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snap.symbol)
        .bind(snap.timestamp.to_rfc3339())
        .bind(snap.close)
        .bind(snap.blue.value)
        .bind(snap.blue.slope.as_str())
        .bind(snap.blue.deviation)
        .bind(snap.blue.volume_ratio)
        .bind(snap.green.value)
        .bind(snap.green.slope.as_str())
        .bind(snap.green.deviation)
        .bind(snap.green.volume_ratio)
        .bind(snap.orange.value)
        .bind(snap.orange.slope.as_str())
        .bind(snap.orange.deviation)
        .bind(snap.orange.volume_ratio)
        .bind(snap.rsi)
        .bind(snap.macd.map(|m| m.line))
        .bind(snap.macd.map(|m| m.signal))
        .bind(snap.macd.map(|m| m.histogram))
        .bind(snap.trend_strength as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Signals ====================

    /// Save a signal, returning its row id.
    pub async fn save_signal(&self, signal: &Signal) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO signals (symbol, strategy, direction, strength, trigger_price, generated_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&signal.symbol)
        .bind(signal.strategy.as_str())
        .bind(signal.direction.as_str())
        .bind(signal.strength)
        .bind(signal.trigger_price)
        .bind(signal.generated_at.to_rfc3339())
        .bind(signal.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(sqlx::Row::get(&result, "id"))
    }

    pub async fn update_signal_status(&self, signal_id: i64, status: SignalStatus) -> Result<()> {
        sqlx::query(
            "UPDATE signals SET status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(signal_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Count signals per status for one trading day.
    pub async fn signal_status_counts(&self, day: &str) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM signals WHERE generated_at LIKE ? || '%' GROUP BY status",
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ==================== Orders ====================

    pub async fn save_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, symbol, side, quantity, price, price_type, strategy, status, submitted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.quantity as i64)
        .bind(order.price.to_f64().unwrap_or(0.0))
        .bind(order.price_type.as_str())
        .bind(order.strategy.map(|s| s.as_str()))
        .bind(order.status.as_str())
        .bind(order.submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: &str,
        gateway_order_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                status = ?,
                gateway_order_id = COALESCE(?, gateway_order_id),
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(gateway_order_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Positions ====================

    pub async fn save_position(&self, position: &Position) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions
                (symbol, quantity, average_price, current_price, unrealized_pnl,
                 realized_pnl, direction, strategy, status, opened_at, closed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, direction, opened_at) DO UPDATE SET
                quantity = excluded.quantity,
                average_price = excluded.average_price,
                current_price = excluded.current_price,
                unrealized_pnl = excluded.unrealized_pnl,
                realized_pnl = excluded.realized_pnl,
                status = excluded.status,
                closed_at = excluded.closed_at
            RETURNING id
            "#,
        )
        .bind(&position.symbol)
        .bind(position.quantity as i64)
        .bind(position.average_price.to_f64().unwrap_or(0.0))
        .bind(position.current_price.to_f64().unwrap_or(0.0))
        .bind(position.unrealized_pnl.to_f64().unwrap_or(0.0))
        .bind(position.realized_pnl.to_f64().unwrap_or(0.0))
        .bind(position.direction.as_str())
        .bind(position.strategy.map(|s| s.as_str()))
        .bind(position.status.as_str())
        .bind(position.opened_at.to_rfc3339())
        .bind(position.closed_at.map(|t| t.to_rfc3339()))
        .fetch_one(&self.pool)
        .await?;

        Ok(sqlx::Row::get(&result, "id"))
    }

    pub async fn get_open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, StoredPosition>(
            "SELECT * FROM positions WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch positions")?;

        Ok(rows.into_iter().map(StoredPosition::into_model).collect())
    }

    // ==================== Risk Records ====================

    pub async fn save_risk_record(&self, record: &RiskRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_records (symbol, kind, trigger_value, observed_value, action, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.kind.as_str())
        .bind(record.trigger_value)
        .bind(record.observed_value)
        .bind(&record.action)
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Daily Reports ====================

    /// Persist the post-close report for a trading day, replacing any
    /// earlier run.
    pub async fn save_daily_report(&self, trade_date: &str, report_json: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_reports (trade_date, report)
            VALUES (?, ?)
            ON CONFLICT(trade_date) DO UPDATE SET
                report = excluded.report,
                created_at = datetime('now')
            "#,
        )
        .bind(trade_date)
        .bind(report_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_daily_report(&self, trade_date: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT report FROM daily_reports WHERE trade_date = ?")
                .bind(trade_date)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(r,)| r))
    }

    /// Get the connection pool (for advanced queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, StrategyId};
    use rust_decimal_macros::dec;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_signal_roundtrip() {
        let db = test_db().await;
        let signal = Signal::new("2330", StrategyId::BlueLong, 0.8, 525.0, Utc::now());
        let id = db.save_signal(&signal).await.unwrap();
        db.update_signal_status(id, SignalStatus::Triggered)
            .await
            .unwrap();

        let day = Utc::now().format("%Y-%m-%d").to_string();
        let counts = db.signal_status_counts(&day).await.unwrap();
        assert_eq!(counts, vec![("triggered".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_position_roundtrip() {
        let db = test_db().await;
        let position = Position::new(
            "2330",
            1000,
            dec!(525),
            Direction::Long,
            Some(StrategyId::BlueLong),
        );
        db.save_position(&position).await.unwrap();

        let open = db.get_open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, "2330");
        assert_eq!(open[0].quantity, 1000);
        assert_eq!(open[0].strategy, Some(StrategyId::BlueLong));

        // closing removes it from the open set
        let mut closed = position;
        closed.reduce(1000, dec!(540));
        db.save_position(&closed).await.unwrap();
        assert!(db.get_open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bar_dedup() {
        let db = test_db().await;
        let bar = PriceBar::new("2330", Utc::now(), 520.0, 526.0, 518.0, 525.0, 30_000_000);
        db.save_price_bars(&[bar.clone(), bar]).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM price_bars")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_order_status_update() {
        let db = test_db().await;
        let order = Order::new("2330", OrderSide::Buy, 1000, dec!(525), None);
        db.save_order(&order).await.unwrap();
        db.update_order_status(&order.id, "filled", Some("SIM_abc"))
            .await
            .unwrap();

        let (status, gateway_id): (String, Option<String>) = sqlx::query_as(
            "SELECT status, gateway_order_id FROM orders WHERE id = ?",
        )
        .bind(&order.id)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(status, "filled");
        assert_eq!(gateway_id.as_deref(), Some("SIM_abc"));
    }
}
