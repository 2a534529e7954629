//! Exchange Gateway Trait
//!
//! Common interface over the futures exchange the bot trades on. The
//! execution cycle only talks to this trait, which keeps the cycle testable
//! with a mock gateway and keeps exchange-specific wire details out of the
//! decision logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the exchange
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Exchange rejected request (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed exchange response: {0}")]
    MalformedResponse(String),
}

/// Order side on the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that closes a position opened with this side
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Kind of conditional exit order attached to a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    StopLoss,
    TakeProfit,
}

/// One OHLCV candle as returned by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A resting order on the exchange
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub order_id: i64,
    pub symbol: String,
}

/// Futures exchange operations required by the execution cycle
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Last traded price for the symbol
    async fn ticker_price(&self, symbol: &str) -> Result<f64, GatewayError>;

    /// Free quote-currency balance available for new positions
    async fn available_balance(&self) -> Result<f64, GatewayError>;

    /// Signed position quantity for the symbol (positive long, negative
    /// short, zero when flat)
    async fn position_amount(&self, symbol: &str) -> Result<f64, GatewayError>;

    /// All resting orders for the symbol
    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError>;

    /// Cancel a single resting order
    async fn cancel_order(&self, order_id: i64, symbol: &str) -> Result<(), GatewayError>;

    /// Historical OHLCV candles, oldest first
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Set account leverage for the symbol
    async fn set_leverage(&self, leverage: i32, symbol: &str) -> Result<(), GatewayError>;

    /// Place a market order for `quantity` base units
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<(), GatewayError>;

    /// Place a stop-market or take-profit-market order that closes the
    /// position when `stop_price` is touched
    async fn place_exit_order(
        &self,
        symbol: &str,
        kind: ExitKind,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Result<(), GatewayError>;
}
