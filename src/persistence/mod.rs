//! Persistence Layer
//!
//! SQLite-backed trade ledger with async access via sqlx. Two append-only
//! tables: `trades` (one row per opened position) and `ai_analysis` (one row
//! per completed decision attempt, traded or not). The execution cycle is
//! the only writer; the report binary is a read-only consumer of the same
//! file.
//!
//! # Database Schema
//!
//! ## trades
//! - direction: "LONG" or "SHORT"
//! - entry/stop-loss/take-profit prices and percentages
//! - risk_reward_ratio: tp% / sl%, computed once at entry
//! - status: "OPEN" or "CLOSED"; exit fields stay NULL until a future
//!   reconciliation pass closes the row
//!
//! ## ai_analysis
//! - action_taken: TRADE_EXECUTED, NO_TRADE, BELOW_MINIMUM or SKIPPED
//! - numeric recommendation fields are NULL for unparseable responses

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization and query errors
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Initialize the database connection pool and run migrations.
///
/// `database_url` is a SQLite URL such as `sqlite://data/trading_history.db`
/// or `sqlite::memory:` in tests.
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure the data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized");

    Ok(pool)
}

/// Create tables and indexes if absent. No other migrations exist.
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME NOT NULL,
            direction TEXT NOT NULL,
            entry_price REAL NOT NULL,
            position_size_usdt REAL NOT NULL,
            btc_amount REAL NOT NULL,
            leverage INTEGER NOT NULL,
            stop_loss_price REAL NOT NULL,
            stop_loss_percentage REAL NOT NULL,
            take_profit_price REAL NOT NULL,
            take_profit_percentage REAL NOT NULL,
            risk_reward_ratio REAL,
            available_balance REAL,
            conviction_level REAL,
            reasoning TEXT,
            status TEXT NOT NULL DEFAULT 'OPEN',
            exit_price REAL,
            exit_timestamp DATETIME,
            profit_loss REAL,
            profit_loss_percentage REAL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_analysis (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME NOT NULL,
            current_price REAL NOT NULL,
            available_balance REAL NOT NULL,
            direction TEXT NOT NULL,
            position_size_fraction REAL,
            recommended_leverage INTEGER,
            stop_loss_percentage REAL,
            take_profit_percentage REAL,
            reasoning TEXT,
            action_taken TEXT NOT NULL,
            market_condition TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create ai_analysis table: {}", e))
    })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analysis_timestamp ON ai_analysis(timestamp)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database("sqlite::memory:").await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations_create_both_tables() {
        let pool = init_database("sqlite::memory:").await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('trades', 'ai_analysis')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 2);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
