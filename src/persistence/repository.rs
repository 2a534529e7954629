//! Trade Ledger
//!
//! Data access layer for the `trades` and `ai_analysis` tables. Both tables
//! are append-only from the cycle's point of view; nothing here updates
//! existing rows.

use super::models::*;
use super::{DatabaseError, DbPool};
use sqlx::Row;
use tracing::{debug, error};

/// Repository over the ledger tables
#[derive(Clone)]
pub struct TradeLedger {
    pool: DbPool,
}

impl TradeLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a trade row, returning its assigned id
    pub async fn insert_trade(&self, trade: &NewTrade) -> Result<i64, DatabaseError> {
        let record = sqlx::query_as::<_, TradeRecord>(
            r#"
            INSERT INTO trades (
                timestamp, direction, entry_price, position_size_usdt, btc_amount,
                leverage, stop_loss_price, stop_loss_percentage, take_profit_price,
                take_profit_percentage, risk_reward_ratio, available_balance,
                conviction_level, reasoning, status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 'OPEN')
            RETURNING *
            "#,
        )
        .bind(trade.timestamp)
        .bind(&trade.direction)
        .bind(trade.entry_price)
        .bind(trade.position_size_usdt)
        .bind(trade.btc_amount)
        .bind(trade.leverage)
        .bind(trade.stop_loss_price)
        .bind(trade.stop_loss_percentage)
        .bind(trade.take_profit_price)
        .bind(trade.take_profit_percentage)
        .bind(trade.risk_reward_ratio)
        .bind(trade.available_balance)
        .bind(trade.conviction_level)
        .bind(&trade.reasoning)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert trade: {}", e);
            DatabaseError::QueryError(format!("Failed to insert trade: {}", e))
        })?;

        debug!("Saved trade {} ({})", record.id, record.direction);
        Ok(record.id)
    }

    /// Append an analysis row
    pub async fn insert_analysis(&self, analysis: &NewAnalysis) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO ai_analysis (
                timestamp, current_price, available_balance, direction,
                position_size_fraction, recommended_leverage, stop_loss_percentage,
                take_profit_percentage, reasoning, action_taken, market_condition
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(analysis.timestamp)
        .bind(analysis.current_price)
        .bind(analysis.available_balance)
        .bind(&analysis.direction)
        .bind(analysis.position_size_fraction)
        .bind(analysis.recommended_leverage)
        .bind(analysis.stop_loss_percentage)
        .bind(analysis.take_profit_percentage)
        .bind(&analysis.reasoning)
        .bind(analysis.action_taken.as_str())
        .bind(&analysis.market_condition)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert analysis: {}", e);
            DatabaseError::QueryError(format!("Failed to insert analysis: {}", e))
        })?;

        Ok(())
    }

    /// Most recent trades, newest first
    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get recent trades: {}", e);
            DatabaseError::QueryError(format!("Failed to get recent trades: {}", e))
        })?;

        Ok(records)
    }

    /// Most recent analysis rows, newest first
    pub async fn recent_analyses(&self, limit: i64) -> Result<Vec<AnalysisRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, AnalysisRecord>(
            "SELECT * FROM ai_analysis ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get recent analyses: {}", e);
            DatabaseError::QueryError(format!("Failed to get recent analyses: {}", e))
        })?;

        Ok(records)
    }

    /// Aggregate statistics over all persisted trades
    pub async fn statistics(&self) -> Result<LedgerStats, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_trades,
                COALESCE(SUM(CASE WHEN direction = 'LONG' THEN 1 ELSE 0 END), 0) AS long_trades,
                COALESCE(SUM(CASE WHEN direction = 'SHORT' THEN 1 ELSE 0 END), 0) AS short_trades,
                AVG(leverage) AS avg_leverage,
                AVG(risk_reward_ratio) AS avg_risk_reward,
                AVG(position_size_usdt) AS avg_position_size
            FROM trades
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to compute ledger statistics: {}", e);
            DatabaseError::QueryError(format!("Failed to compute statistics: {}", e))
        })?;

        Ok(LedgerStats {
            total_trades: row.get("total_trades"),
            long_trades: row.get("long_trades"),
            short_trades: row.get("short_trades"),
            avg_leverage: row.get("avg_leverage"),
            avg_risk_reward: row.get("avg_risk_reward"),
            avg_position_size: row.get("avg_position_size"),
        })
    }
}
