//! Read-only ledger report
//!
//! Prints the same aggregates the live loop feeds back to the oracle, plus
//! a closed-trade P&L summary. Never writes to the database; safe to run
//! alongside the trading process.

use sibyl::config::AppConfig;
use sibyl::persistence::repository::TradeLedger;
use sibyl::persistence::{init_database, DatabaseError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How many rows each listing section shows
const LISTING_LIMIT: i64 = 20;

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

async fn print_report(ledger: &TradeLedger) -> Result<(), DatabaseError> {
    let stats = ledger.statistics().await?;

    println!("=== Trading Ledger Report ===");
    println!();
    println!("Total trades:       {}", stats.total_trades);
    println!("  Long:             {}", stats.long_trades);
    println!("  Short:            {}", stats.short_trades);
    println!("Avg leverage:       {}", fmt_opt(stats.avg_leverage));
    println!("Avg risk/reward:    {}", fmt_opt(stats.avg_risk_reward));
    println!(
        "Avg position size:  {} USDT",
        fmt_opt(stats.avg_position_size)
    );

    let trades = ledger.recent_trades(LISTING_LIMIT).await?;

    let closed: Vec<_> = trades.iter().filter(|t| t.profit_loss.is_some()).collect();
    if !closed.is_empty() {
        let wins = closed
            .iter()
            .filter(|t| t.profit_loss.unwrap_or(0.0) > 0.0)
            .count();
        let total_pnl: f64 = closed.iter().filter_map(|t| t.profit_loss).sum();
        println!();
        println!(
            "Closed trades:      {} ({} wins, {:.1}% win rate)",
            closed.len(),
            wins,
            wins as f64 / closed.len() as f64 * 100.0
        );
        println!("Realized P&L:       {:.2} USDT", total_pnl);
    }

    println!();
    println!("--- Recent trades ---");
    if trades.is_empty() {
        println!("(none)");
    }
    for t in &trades {
        println!(
            "#{:<4} {} {:>5} {:>10.2} USDT @ {:>10.2} {}x  SL {:>10.2}  TP {:>10.2}  [{}]",
            t.id,
            t.timestamp.format("%Y-%m-%d %H:%M"),
            t.direction,
            t.position_size_usdt,
            t.entry_price,
            t.leverage,
            t.stop_loss_price,
            t.take_profit_price,
            t.status
        );
    }

    println!();
    println!("--- Recent analyses ---");
    let analyses = ledger.recent_analyses(LISTING_LIMIT).await?;
    if analyses.is_empty() {
        println!("(none)");
    }
    for a in &analyses {
        println!(
            "#{:<4} {} {:>12} -> {:<14} {}",
            a.id,
            a.timestamp.format("%Y-%m-%d %H:%M"),
            a.direction,
            a.action_taken,
            a.market_condition.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sibyl=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let pool = init_database(&config.database_url).await?;
    let ledger = TradeLedger::new(pool);

    print_report(&ledger).await?;
    Ok(())
}
