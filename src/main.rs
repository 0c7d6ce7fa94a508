//! Moving-average signal engine and execution orchestrator.
//!
//! Derives trading signals from blue/green/orange moving-average
//! relationships, monitors live prices through the session, and dispatches
//! risk-gated orders to a brokerage gateway (or a simulated one).

mod api;
mod config;
mod db;
mod error;
mod indicators;
mod models;
mod monitor;
mod orchestrator;
mod risk;
mod strategy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::ExecutionGateway;
use crate::config::AppConfig;
use crate::db::Database;
use crate::orchestrator::Orchestrator;

/// Signal engine CLI.
#[derive(Parser)]
#[command(name = "tritrend")]
#[command(about = "Moving-average signal engine and execution orchestrator", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./tritrend.db?mode=rwc")]
    database: String,

    /// Configuration file (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run signal generation once and print the ranked queue
    Analyze,

    /// Start the daily trading cycle
    Run {
        /// Force simulation mode even when brokerage credentials exist
        #[arg(long)]
        simulate: bool,
    },

    /// Show today's signal and position status
    Status,

    /// Show the effective configuration
    Config,

    /// Print the stored daily report for a date (YYYY-MM-DD)
    Report { date: String },
}

fn load_config(path: Option<&str>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("Failed to parse {path}"))?
        }
        None => AppConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;
    let db = Database::new(&cli.database).await?;

    match cli.command {
        Commands::Analyze => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let gateway = ExecutionGateway::from_env();
            let orchestrator = Orchestrator::new(config, gateway, db, shutdown)?;

            let signals = orchestrator.analyze().await?;
            if signals.is_empty() {
                println!("No signals for today's universe.");
                return Ok(());
            }

            println!(
                "\n{:<8} {:<14} {:<6} {:>9} {:>10}",
                "SYMBOL", "STRATEGY", "DIR", "STRENGTH", "TRIGGER"
            );
            println!("{}", "-".repeat(52));
            for signal in signals {
                println!(
                    "{:<8} {:<14} {:<6} {:>9.3} {:>10.2}",
                    signal.symbol,
                    signal.strategy.as_str(),
                    signal.direction.as_str(),
                    signal.strength,
                    signal.trigger_price
                );
            }
        }

        Commands::Run { simulate } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("shutdown signal received");
                        shutdown.store(true, Ordering::SeqCst);
                    }
                });
            }

            let gateway = if simulate {
                ExecutionGateway::Simulated(api::SimulatedGateway)
            } else {
                ExecutionGateway::from_env()
            };

            println!("\n=== Signal Engine ===");
            println!("Symbols:  {}", config.trading.symbols.join(", "));
            println!(
                "Session:  {} - {} (prep {})",
                config.session.open_time, config.session.close_time, config.session.prep_time
            );
            println!(
                "Mode:     {}",
                if gateway.is_simulated() {
                    "SIMULATION (synthetic fills)"
                } else {
                    "LIVE TRADING"
                }
            );
            println!("\nPress Ctrl+C to stop.\n");

            let orchestrator = Orchestrator::new(config, gateway, db, shutdown)?;
            orchestrator.run().await?;
        }

        Commands::Status => {
            let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
            let counts = db.signal_status_counts(&day).await?;
            let positions = db.get_open_positions().await?;

            println!("\n=== Signals ({day}) ===");
            if counts.is_empty() {
                println!("No signals generated today.");
            }
            for (status, count) in counts {
                println!("{:<12} {}", status, count);
            }

            println!("\n=== Open Positions ({}) ===", positions.len());
            for pos in &positions {
                println!(
                    "  {} {} {} @ {} (unrealized {})",
                    pos.symbol,
                    pos.direction.as_str(),
                    pos.quantity,
                    pos.average_price,
                    pos.unrealized_pnl
                );
            }
        }

        Commands::Config => {
            println!("\n=== Indicators ===");
            println!("Blue period:    {}", config.indicators.blue_period);
            println!("Green period:   {}", config.indicators.green_period);
            println!("Orange period:  {}", config.indicators.orange_period);
            println!("RSI period:     {}", config.indicators.rsi_period);
            println!(
                "MACD:           {}/{}/{}",
                config.indicators.macd_fast,
                config.indicators.macd_slow,
                config.indicators.macd_signal
            );

            println!("\n=== Strategy ===");
            println!(
                "Deviation band: {} - {}",
                config.strategy.deviation_band_min, config.strategy.deviation_band_max
            );
            println!(
                "Volume breakout threshold: {}",
                config.strategy.volume_breakout_threshold
            );
            println!(
                "Strength weights: deviation {} / volume {} / slope {}",
                config.strategy.weight_deviation,
                config.strategy.weight_volume,
                config.strategy.weight_slope
            );

            println!("\n=== Filter ===");
            println!("Min strength:         {}", config.filter.min_signal_strength);
            println!(
                "Max signals/symbol:   {}",
                config.filter.max_signals_per_symbol
            );

            println!("\n=== Monitor ===");
            println!(
                "Price interval:       {}s",
                config.monitor.price_interval_secs
            );
            println!(
                "Liveness interval:    {}s",
                config.monitor.liveness_interval_secs
            );
            println!("Trigger tolerance:    {}", config.monitor.trigger_tolerance);

            println!("\n=== Risk ===");
            println!("Max order amount:     {}", config.risk.max_order_amount);
            println!("Max open positions:   {}", config.risk.max_open_positions);
            println!("Max daily orders:     {}", config.risk.max_daily_orders);
            println!("Stop loss:            {}%", config.risk.stop_loss_pct * 100.0);
            println!(
                "Take profit:          {}%",
                config.risk.take_profit_pct * 100.0
            );
            println!("Exit bars:            {}", config.risk.exit_bars);

            println!("\n=== Session ===");
            println!("Prep:   {}", config.session.prep_time);
            println!("Open:   {}", config.session.open_time);
            println!("Close:  {}", config.session.close_time);

            println!("\n=== Trading ===");
            println!("Symbols:          {}", config.trading.symbols.join(", "));
            println!("Default quantity: {}", config.trading.default_quantity);
            println!("Lot size:         {}", config.trading.lot_size);
        }

        Commands::Report { date } => match db.get_daily_report(&date).await? {
            Some(report) => {
                let parsed: orchestrator::DailyReport =
                    serde_json::from_str(&report).context("stored report is malformed")?;
                println!("{parsed}");
            }
            None => println!("No report stored for {date}."),
        },
    }

    Ok(())
}
