//! Row types for the trade ledger

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Tag describing what the cycle did with a completed analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTaken {
    TradeExecuted,
    NoTrade,
    BelowMinimum,
    Skipped,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTaken::TradeExecuted => "TRADE_EXECUTED",
            ActionTaken::NoTrade => "NO_TRADE",
            ActionTaken::BelowMinimum => "BELOW_MINIMUM",
            ActionTaken::Skipped => "SKIPPED",
        }
    }
}

/// One opened position, as persisted
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TradeRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub direction: String,
    pub entry_price: f64,
    pub position_size_usdt: f64,
    pub btc_amount: f64,
    pub leverage: i64,
    pub stop_loss_price: f64,
    pub stop_loss_percentage: f64,
    pub take_profit_price: f64,
    pub take_profit_percentage: f64,
    pub risk_reward_ratio: Option<f64>,
    pub available_balance: Option<f64>,
    pub conviction_level: Option<f64>,
    pub reasoning: Option<String>,
    pub status: String,
    pub exit_price: Option<f64>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub profit_loss: Option<f64>,
    pub profit_loss_percentage: Option<f64>,
}

/// Insert payload for a new trade row; status is always OPEN and the exit
/// fields start NULL
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub timestamp: DateTime<Utc>,
    pub direction: String,
    pub entry_price: f64,
    pub position_size_usdt: f64,
    pub btc_amount: f64,
    pub leverage: i64,
    pub stop_loss_price: f64,
    pub stop_loss_percentage: f64,
    pub take_profit_price: f64,
    pub take_profit_percentage: f64,
    pub risk_reward_ratio: f64,
    pub available_balance: f64,
    pub conviction_level: f64,
    pub reasoning: String,
}

/// One decision-analysis attempt, as persisted
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub available_balance: f64,
    pub direction: String,
    pub position_size_fraction: Option<f64>,
    pub recommended_leverage: Option<i64>,
    pub stop_loss_percentage: Option<f64>,
    pub take_profit_percentage: Option<f64>,
    pub reasoning: Option<String>,
    pub action_taken: String,
    pub market_condition: Option<String>,
}

/// Insert payload for a new analysis row. Recommendation fields are None
/// when the oracle response never parsed.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub available_balance: f64,
    pub direction: String,
    pub position_size_fraction: Option<f64>,
    pub recommended_leverage: Option<i64>,
    pub stop_loss_percentage: Option<f64>,
    pub take_profit_percentage: Option<f64>,
    pub reasoning: Option<String>,
    pub action_taken: ActionTaken,
    pub market_condition: Option<String>,
}

/// Aggregate statistics over persisted trades
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    pub total_trades: i64,
    pub long_trades: i64,
    pub short_trades: i64,
    pub avg_leverage: Option<f64>,
    pub avg_risk_reward: Option<f64>,
    pub avg_position_size: Option<f64>,
}
