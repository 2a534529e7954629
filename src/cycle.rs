//! Execution Cycle
//!
//! The control loop orchestrating one decision per iteration:
//!
//! check position -> (open: idle) | (flat: cancel stale orders -> build
//! snapshot -> ask oracle -> validate/size -> place orders or record a
//! no-trade), then persist the outcome and wait out the cool-down.
//!
//! Open positions are never re-evaluated mid-flight; the cycle just polls
//! until the exchange reports the symbol flat again. A decision that fails
//! to parse is recorded as SKIPPED and retried implicitly on the next
//! cycle, never inline. Any other error surfaces to `run`, which logs it,
//! backs off briefly and keeps looping; nothing short of external
//! termination stops the process.

use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::domain::decision::{
    parse_decision, DecisionOracle, Direction, OracleDecision, OracleError,
};
use crate::domain::gateway::{ExchangeGateway, ExitKind, GatewayError, OrderSide};
use crate::domain::news::NewsFeed;
use crate::domain::plan::{build_order_plan, NoTradeReason, OrderPlan, Verdict};
use crate::persistence::models::{ActionTaken, NewAnalysis, NewTrade};
use crate::persistence::repository::TradeLedger;
use crate::persistence::DatabaseError;
use crate::snapshot::build_snapshot;

/// Instruction prompt sent with every decision request. The oracle reviews
/// its own persisted history before sizing anything.
pub const SYSTEM_PROMPT: &str = r#"You are an advanced crypto trading AI with self-learning capabilities. You analyze multi-timeframe data, news sentiment, and YOUR OWN PAST TRADING PERFORMANCE to continuously improve your decision-making.

CORE INVESTMENT PRINCIPLES:
- Rule No.1: Never lose money.
- Rule No.2: Never forget rule No.1.

SELF-LEARNING PROCESS:

1. REVIEW YOUR PAST PERFORMANCE:
   * Analyze your recent_trades: What patterns led to success or failure?
   * Review your recent_analysis: Were your predictions accurate?
   * Examine your statistics: Are you overusing certain strategies?
   * Identify mistakes: Did you trade in unfavorable conditions?

2. SELF-REFLECTION QUESTIONS:
   * Am I being too aggressive with leverage in volatile markets?
   * Are my stop-loss levels too tight or too wide based on past trades?
   * Am I overtrading in similar market conditions?

3. ADAPT YOUR STRATEGY:
   * If recent trades show high leverage failures, reduce leverage recommendation.
   * If stop-losses are frequently hit prematurely, widen SL based on volatility.
   * If certain market conditions consistently failed, avoid similar setups.

4. CURRENT MARKET ANALYSIS:
   * Short-term trend (15m): recent price action and momentum.
   * Medium-term trend (1h): intermediate market direction.
   * Long-term trend (4h): overall market bias.
   * Volatility across timeframes, key support/resistance levels.
   * News sentiment: bullish or bearish indicators.

5. CONVICTION ASSESSMENT:
   * Probability of success (51-95%), grounded in current analysis AND past performance patterns.
   * If similar past setups failed, LOWER your conviction.

6. KELLY CRITERION POSITION SIZING:
   * f* = (p - q) / b where p = probability of success, q = 1 - p, b = win/loss ratio.
   * Apply Half-Kelly (50%) for safety.

7. OPTIMAL LEVERAGE:
   * Low volatility + strong trend = higher leverage (up to 20x).
   * High volatility or uncertainty = lower leverage (1-3x).

8. STOP LOSS & TAKE PROFIT:
   * Set SL at the technical invalidation level, TP at a realistic technical target.

9. RISK MANAGEMENT:
   * Never exceed Half-Kelly. Minimum 55% conviction to trade.
   * If uncertain, choose NO_POSITION.

RESPONSE FORMAT (JSON only):

{
  "direction": "LONG" or "SHORT" or "NO_POSITION",
  "recommended_position_size": [decimal 0.1-1.0],
  "recommended_leverage": [integer 1-20],
  "stop_loss_percentage": [decimal, e.g. 0.005],
  "take_profit_percentage": [decimal],
  "reasoning": "What you learned from past trades, how it influences this decision, and your current market analysis"
}

IMPORTANT:
- Do NOT use markdown code blocks (```json)
- Return ONLY the raw JSON object
- Your reasoning MUST reference your historical performance"#;

/// Errors that abort a single cycle iteration
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("exchange gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("decision oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("ledger error: {0}")]
    Database(#[from] DatabaseError),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Terminal outcome of one cycle iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A position is open; nothing was evaluated
    PositionOpen,
    /// Orders were placed and persisted
    TradeExecuted,
    /// Oracle declined or validation rejected; analysis persisted
    NoTrade,
    /// Oracle response did not parse; skip persisted
    Skipped,
}

/// The trading loop with its collaborators injected
pub struct ExecutionCycle<G, O, N> {
    gateway: G,
    oracle: O,
    news: N,
    ledger: TradeLedger,
    config: AppConfig,
}

impl<G, O, N> ExecutionCycle<G, O, N>
where
    G: ExchangeGateway,
    O: DecisionOracle,
    N: NewsFeed,
{
    pub fn new(gateway: G, oracle: O, news: N, ledger: TradeLedger, config: AppConfig) -> Self {
        Self {
            gateway,
            oracle,
            news,
            ledger,
            config,
        }
    }

    pub fn gateway_ref(&self) -> &G {
        &self.gateway
    }

    pub fn oracle_ref(&self) -> &O {
        &self.oracle
    }

    /// Run the loop forever. Individual cycle errors are logged and backed
    /// off, never fatal.
    pub async fn run(&self) {
        info!("Execution cycle started for {}", self.config.symbol);
        loop {
            match self.run_once().await {
                Ok(CycleOutcome::PositionOpen) => {
                    tokio::time::sleep(Duration::from_secs(self.config.position_poll_secs)).await;
                }
                Ok(outcome) => {
                    info!(
                        "Cycle complete ({:?}), waiting {}s before next analysis",
                        outcome, self.config.cooldown_secs
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.cooldown_secs)).await;
                }
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(self.config.error_backoff_secs)).await;
                }
            }
        }
    }

    /// One full iteration of the state machine
    pub async fn run_once(&self) -> Result<CycleOutcome, CycleError> {
        let symbol = &self.config.symbol;

        let current_price = self.gateway.ticker_price(symbol).await?;
        let available_balance = self.gateway.available_balance().await?;
        info!(
            "{} at {:.2}, available balance {:.2} USDT",
            symbol, current_price, available_balance
        );

        let position_amt = self.gateway.position_amount(symbol).await?;
        if position_amt != 0.0 {
            let side = if position_amt > 0.0 { "LONG" } else { "SHORT" };
            info!("Position open: {} {} {}", side, position_amt.abs(), symbol);
            return Ok(CycleOutcome::PositionOpen);
        }

        self.cancel_stale_orders(symbol).await;
        tokio::time::sleep(Duration::from_secs(self.config.order_settle_secs)).await;

        info!("Analyzing market for trading opportunity...");
        let snapshot = build_snapshot(
            &self.gateway,
            &self.news,
            &self.ledger,
            symbol,
            &self.config.news_query,
            current_price,
            available_balance,
        )
        .await?;
        let payload = serde_json::to_string(&snapshot)?;

        let raw = self.oracle.complete(SYSTEM_PROMPT, &payload).await?;

        let decision = match parse_decision(&raw) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Unparseable oracle response: {}", e.reason);
                warn!("Raw response: {}", e.raw);
                self.ledger
                    .insert_analysis(&NewAnalysis {
                        timestamp: Utc::now(),
                        current_price,
                        available_balance,
                        direction: "ERROR".to_string(),
                        position_size_fraction: None,
                        recommended_leverage: None,
                        stop_loss_percentage: None,
                        take_profit_percentage: None,
                        reasoning: Some(format!("JSON parse error: {}", e.reason)),
                        action_taken: ActionTaken::Skipped,
                        market_condition: None,
                    })
                    .await?;
                info!("Skipping this trading cycle");
                return Ok(CycleOutcome::Skipped);
            }
        };

        info!(
            "Oracle decision: {} size={:.2} leverage={} sl={:.3}% tp={:.3}%",
            decision.direction,
            decision.position_size_fraction,
            decision.leverage,
            decision.stop_loss_pct * 100.0,
            decision.take_profit_pct * 100.0
        );
        info!("Reasoning: {}", decision.reasoning);

        match build_order_plan(&decision, available_balance, current_price) {
            Verdict::NoTrade(reason) => {
                let (action, condition) = match reason {
                    NoTradeReason::NoPosition => {
                        info!("Oracle decision: NO_POSITION (insufficient edge)");
                        (ActionTaken::NoTrade, "Learning from past")
                    }
                    NoTradeReason::BelowMinimum => {
                        warn!("Position size below the {} USDT minimum", crate::domain::plan::MIN_NOTIONAL_USDT);
                        (ActionTaken::BelowMinimum, "Position too small")
                    }
                };
                self.ledger
                    .insert_analysis(&self.analysis_row(
                        &decision,
                        current_price,
                        available_balance,
                        action,
                        condition,
                    ))
                    .await?;
                Ok(CycleOutcome::NoTrade)
            }
            Verdict::Trade(plan) => {
                self.execute_trade(&decision, &plan, available_balance, current_price)
                    .await?;
                Ok(CycleOutcome::TradeExecuted)
            }
        }
    }

    /// Cancel resting orders left over from a closed position. Best-effort:
    /// failures are logged and the cycle proceeds.
    async fn cancel_stale_orders(&self, symbol: &str) {
        match self.gateway.open_orders(symbol).await {
            Ok(orders) if orders.is_empty() => {
                info!("No open orders to cancel");
            }
            Ok(orders) => {
                for order in &orders {
                    if let Err(e) = self.gateway.cancel_order(order.order_id, symbol).await {
                        warn!("Failed to cancel order {}: {}", order.order_id, e);
                    }
                }
                info!("Cancelled {} stale orders", orders.len());
            }
            Err(e) => {
                warn!("Failed to list open orders: {}", e);
            }
        }
    }

    /// Place the market entry plus both exit orders, then persist the trade
    /// and its analysis record
    async fn execute_trade(
        &self,
        decision: &OracleDecision,
        plan: &OrderPlan,
        available_balance: f64,
        current_price: f64,
    ) -> Result<(), CycleError> {
        let symbol = &self.config.symbol;
        let entry_side = match plan.direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
            Direction::NoPosition => unreachable!("validator never plans NO_POSITION"),
        };
        let exit_side = entry_side.opposite();

        info!(
            "Placing {} {} {:.3} ({:.2} USDT at {}x, SL {:.2}, TP {:.2}, R/R 1:{:.2})",
            plan.direction,
            symbol,
            plan.quantity,
            plan.position_size_quote,
            plan.leverage,
            plan.stop_loss_price,
            plan.take_profit_price,
            plan.risk_reward_ratio
        );

        self.gateway.set_leverage(plan.leverage, symbol).await?;
        self.gateway
            .place_market_order(symbol, entry_side, plan.quantity)
            .await?;
        self.gateway
            .place_exit_order(
                symbol,
                ExitKind::StopLoss,
                exit_side,
                plan.quantity,
                plan.stop_loss_price,
            )
            .await?;
        self.gateway
            .place_exit_order(
                symbol,
                ExitKind::TakeProfit,
                exit_side,
                plan.quantity,
                plan.take_profit_price,
            )
            .await?;

        let trade_id = self
            .ledger
            .insert_trade(&NewTrade {
                timestamp: Utc::now(),
                direction: plan.direction.to_string(),
                entry_price: plan.entry_price,
                position_size_usdt: plan.position_size_quote,
                btc_amount: plan.quantity,
                leverage: plan.leverage as i64,
                stop_loss_price: plan.stop_loss_price,
                stop_loss_percentage: plan.stop_loss_pct,
                take_profit_price: plan.take_profit_price,
                take_profit_percentage: plan.take_profit_pct,
                risk_reward_ratio: plan.risk_reward_ratio,
                available_balance,
                conviction_level: plan.conviction,
                reasoning: decision.reasoning.clone(),
            })
            .await?;
        info!("{} position opened, trade #{}", plan.direction, trade_id);

        self.ledger
            .insert_analysis(&self.analysis_row(
                decision,
                current_price,
                available_balance,
                ActionTaken::TradeExecuted,
                "Learned confidence",
            ))
            .await?;

        self.log_statistics().await;
        Ok(())
    }

    fn analysis_row(
        &self,
        decision: &OracleDecision,
        current_price: f64,
        available_balance: f64,
        action_taken: ActionTaken,
        market_condition: &str,
    ) -> NewAnalysis {
        NewAnalysis {
            timestamp: Utc::now(),
            current_price,
            available_balance,
            direction: decision.direction.to_string(),
            position_size_fraction: Some(decision.position_size_fraction),
            recommended_leverage: Some(decision.leverage.trunc() as i64),
            stop_loss_percentage: Some(decision.stop_loss_pct),
            take_profit_percentage: Some(decision.take_profit_pct),
            reasoning: Some(decision.reasoning.clone()),
            action_taken,
            market_condition: Some(market_condition.to_string()),
        }
    }

    /// Log aggregate ledger statistics; failures here are not worth
    /// aborting a successful trade for
    async fn log_statistics(&self) {
        match self.ledger.statistics().await {
            Ok(stats) => {
                info!(
                    "Ledger: {} trades ({} long / {} short), avg leverage {:.1}x",
                    stats.total_trades,
                    stats.long_trades,
                    stats.short_trades,
                    stats.avg_leverage.unwrap_or(0.0)
                );
            }
            Err(e) => warn!("Failed to read ledger statistics: {}", e),
        }
    }
}
