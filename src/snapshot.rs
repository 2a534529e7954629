//! Market Snapshot Builder
//!
//! Assembles everything the decision oracle sees for one cycle: wall-clock
//! time, last price, free balance, multi-timeframe candles, recent news
//! headlines and the bot's own historical performance. A failing timeframe
//! or news source degrades to an empty slice; ledger errors propagate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::gateway::{Candle, ExchangeGateway};
use crate::domain::news::{Headline, NewsFeed};
use crate::persistence::models::{AnalysisRecord, TradeRecord};
use crate::persistence::repository::TradeLedger;
use crate::persistence::DatabaseError;

/// Fixed candle windows fed to the oracle: short, medium and long horizon
pub const TIMEFRAMES: [(&str, u32); 3] = [("15m", 96), ("1h", 48), ("4h", 30)];

/// How many headlines the snapshot carries at most
pub const NEWS_HEADLINE_LIMIT: usize = 10;

/// Historical window sizes for the performance digest
pub const RECENT_TRADE_LIMIT: i64 = 20;
pub const RECENT_ANALYSIS_LIMIT: i64 = 10;

/// Aggregate statistics over the recent-trade window
#[derive(Debug, Clone, Serialize)]
pub struct DigestStats {
    pub total_trades: usize,
    pub direction_distribution: BTreeMap<String, usize>,
    pub avg_leverage: f64,
    pub avg_risk_reward: f64,
    pub avg_position_size: f64,
}

/// The bot's own track record, shown to the oracle for self-review
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalPerformance {
    pub recent_trades: Vec<TradeRecord>,
    pub recent_analysis: Vec<AnalysisRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<DigestStats>,
}

/// One complete market state payload, serialized as the oracle's user
/// message
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub available_balance: f64,
    pub timeframes: BTreeMap<String, Vec<Candle>>,
    pub news_sentiment: Vec<Headline>,
    pub historical_performance: HistoricalPerformance,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute window statistics from fetched trade rows. Empty window yields
/// no statistics block.
pub fn digest_stats(trades: &[TradeRecord]) -> Option<DigestStats> {
    if trades.is_empty() {
        return None;
    }

    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    for trade in trades {
        *distribution.entry(trade.direction.clone()).or_insert(0) += 1;
    }

    let n = trades.len() as f64;
    let avg_leverage = trades.iter().map(|t| t.leverage as f64).sum::<f64>() / n;
    let avg_rr = trades
        .iter()
        .filter_map(|t| t.risk_reward_ratio)
        .sum::<f64>()
        / n;
    let avg_size = trades.iter().map(|t| t.position_size_usdt).sum::<f64>() / n;

    Some(DigestStats {
        total_trades: trades.len(),
        direction_distribution: distribution,
        avg_leverage: round2(avg_leverage),
        avg_risk_reward: round2(avg_rr),
        avg_position_size: round2(avg_size),
    })
}

/// Build the snapshot for one decision cycle.
///
/// `current_price` and `available_balance` were already fetched by the
/// caller; their failures are not recoverable here and never reach this
/// function.
pub async fn build_snapshot<G, N>(
    gateway: &G,
    news: &N,
    ledger: &TradeLedger,
    symbol: &str,
    news_query: &str,
    current_price: f64,
    available_balance: f64,
) -> Result<MarketSnapshot, DatabaseError>
where
    G: ExchangeGateway + ?Sized,
    N: NewsFeed + ?Sized,
{
    let mut timeframes = BTreeMap::new();
    for (interval, limit) in TIMEFRAMES {
        match gateway.fetch_ohlcv(symbol, interval, limit).await {
            Ok(candles) => {
                debug!("Collected {} candles for {}", candles.len(), interval);
                timeframes.insert(interval.to_string(), candles);
            }
            Err(e) => {
                warn!("Failed to fetch {} candles, omitting timeframe: {}", interval, e);
            }
        }
    }

    let news_sentiment = match news.headlines(news_query).await {
        Ok(mut headlines) => {
            headlines.truncate(NEWS_HEADLINE_LIMIT);
            debug!("Fetched {} news headlines", headlines.len());
            headlines
        }
        Err(e) => {
            warn!("News fetch failed, proceeding without headlines: {}", e);
            Vec::new()
        }
    };

    let recent_trades = ledger.recent_trades(RECENT_TRADE_LIMIT).await?;
    let recent_analysis = ledger.recent_analyses(RECENT_ANALYSIS_LIMIT).await?;
    let statistics = digest_stats(&recent_trades);

    Ok(MarketSnapshot {
        timestamp: Utc::now(),
        current_price,
        available_balance,
        timeframes,
        news_sentiment,
        historical_performance: HistoricalPerformance {
            recent_trades,
            recent_analysis,
            statistics,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(direction: &str, leverage: i64, rr: f64, size: f64) -> TradeRecord {
        TradeRecord {
            id: 1,
            timestamp: Utc::now(),
            direction: direction.to_string(),
            entry_price: 50_000.0,
            position_size_usdt: size,
            btc_amount: 0.01,
            leverage,
            stop_loss_price: 49_500.0,
            stop_loss_percentage: 0.01,
            take_profit_price: 51_000.0,
            take_profit_percentage: 0.02,
            risk_reward_ratio: Some(rr),
            available_balance: Some(1_000.0),
            conviction_level: Some(0.5),
            reasoning: None,
            status: "OPEN".to_string(),
            exit_price: None,
            exit_timestamp: None,
            profit_loss: None,
            profit_loss_percentage: None,
        }
    }

    #[test]
    fn test_digest_stats_empty_window() {
        assert!(digest_stats(&[]).is_none());
    }

    #[test]
    fn test_digest_stats_aggregation() {
        let trades = vec![
            trade("LONG", 4, 2.0, 200.0),
            trade("LONG", 8, 3.0, 400.0),
            trade("SHORT", 6, 1.0, 300.0),
        ];
        let stats = digest_stats(&trades).unwrap();
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.direction_distribution["LONG"], 2);
        assert_eq!(stats.direction_distribution["SHORT"], 1);
        assert_eq!(stats.avg_leverage, 6.0);
        assert_eq!(stats.avg_risk_reward, 2.0);
        assert_eq!(stats.avg_position_size, 300.0);
    }

    #[test]
    fn test_digest_stats_rounds_to_two_decimals() {
        let trades = vec![
            trade("LONG", 3, 2.0, 100.0),
            trade("LONG", 4, 2.0, 100.0),
            trade("LONG", 4, 2.0, 100.0),
        ];
        let stats = digest_stats(&trades).unwrap();
        assert_eq!(stats.avg_leverage, 3.67);
    }

    #[test]
    fn test_snapshot_serializes_expected_keys() {
        let snapshot = MarketSnapshot {
            timestamp: Utc::now(),
            current_price: 50_000.0,
            available_balance: 1_000.0,
            timeframes: BTreeMap::new(),
            news_sentiment: Vec::new(),
            historical_performance: HistoricalPerformance {
                recent_trades: Vec::new(),
                recent_analysis: Vec::new(),
                statistics: None,
            },
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value.get("current_price").is_some());
        assert!(value.get("timeframes").is_some());
        assert!(value.get("news_sentiment").is_some());
        assert!(value.get("historical_performance").is_some());
        // no statistics block for an empty window
        assert!(value["historical_performance"].get("statistics").is_none());
    }
}
