//! End-to-end tests for the execution cycle against an in-memory ledger
//! and scripted gateway, oracle and news doubles.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use sibyl::config::AppConfig;
use sibyl::cycle::{CycleOutcome, ExecutionCycle};
use sibyl::domain::decision::{DecisionOracle, OracleError};
use sibyl::domain::gateway::{
    Candle, ExchangeGateway, ExitKind, GatewayError, OpenOrder, OrderSide,
};
use sibyl::domain::news::{Headline, NewsError, NewsFeed};
use sibyl::persistence::init_database;
use sibyl::persistence::repository::TradeLedger;

#[derive(Debug, Clone, PartialEq)]
enum GatewayCall {
    SetLeverage(i32),
    MarketOrder(OrderSide, f64),
    ExitOrder(ExitKind, OrderSide, f64, f64),
    CancelOrder(i64),
}

struct ScriptedGateway {
    price: f64,
    balance: f64,
    position_amt: f64,
    open_orders: Vec<OpenOrder>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl ScriptedGateway {
    fn flat(price: f64, balance: f64) -> Self {
        Self {
            price,
            balance,
            position_amt: 0.0,
            open_orders: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn ticker_price(&self, _symbol: &str) -> Result<f64, GatewayError> {
        Ok(self.price)
    }

    async fn available_balance(&self) -> Result<f64, GatewayError> {
        Ok(self.balance)
    }

    async fn position_amount(&self, _symbol: &str) -> Result<f64, GatewayError> {
        Ok(self.position_amt)
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        Ok(self.open_orders.clone())
    }

    async fn cancel_order(&self, order_id: i64, _symbol: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::CancelOrder(order_id));
        Ok(())
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let candle = Candle {
            timestamp: Utc::now(),
            open: self.price,
            high: self.price * 1.01,
            low: self.price * 0.99,
            close: self.price,
            volume: 12.5,
        };
        Ok(vec![candle; limit.min(3) as usize])
    }

    async fn set_leverage(&self, leverage: i32, _symbol: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::SetLeverage(leverage));
        Ok(())
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::MarketOrder(side, quantity));
        Ok(())
    }

    async fn place_exit_order(
        &self,
        _symbol: &str,
        kind: ExitKind,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::ExitOrder(kind, side, quantity, stop_price));
        Ok(())
    }
}

struct ScriptedOracle {
    response: String,
    completions: AtomicUsize,
}

impl ScriptedOracle {
    fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            completions: AtomicUsize::new(0),
        }
    }

    fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_payload: &str,
    ) -> Result<String, OracleError> {
        assert!(user_payload.contains("current_price"));
        self.completions.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

struct StubNews;

#[async_trait]
impl NewsFeed for StubNews {
    async fn headlines(&self, _query: &str) -> Result<Vec<Headline>, NewsError> {
        Ok(vec![Headline {
            title: "Bitcoin steady ahead of CPI".to_string(),
            date: "1 hour ago".to_string(),
        }])
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.order_settle_secs = 0;
    config
}

async fn test_ledger() -> TradeLedger {
    let pool = init_database("sqlite::memory:").await.unwrap();
    TradeLedger::new(pool)
}

const LONG_DECISION: &str = r#"{
    "direction": "LONG",
    "recommended_position_size": 0.5,
    "recommended_leverage": 5,
    "stop_loss_percentage": 0.01,
    "take_profit_percentage": 0.02,
    "reasoning": "strong uptrend, past longs in this regime worked"
}"#;

#[tokio::test]
async fn executed_trade_places_entry_and_both_exits_and_persists() {
    let ledger = test_ledger().await;
    let cycle = ExecutionCycle::new(
        ScriptedGateway::flat(50_000.0, 10_000.0),
        ScriptedOracle::new(LONG_DECISION),
        StubNews,
        ledger.clone(),
        test_config(),
    );

    let outcome = cycle.run_once().await.unwrap();
    assert_eq!(outcome, CycleOutcome::TradeExecuted);

    // 5000 USDT at 50k -> exactly 0.1 BTC
    let calls = cycle.gateway_ref().calls();
    assert_eq!(
        calls,
        vec![
            GatewayCall::SetLeverage(5),
            GatewayCall::MarketOrder(OrderSide::Buy, 0.1),
            GatewayCall::ExitOrder(ExitKind::StopLoss, OrderSide::Sell, 0.1, 49_500.0),
            GatewayCall::ExitOrder(ExitKind::TakeProfit, OrderSide::Sell, 0.1, 51_000.0),
        ]
    );

    let trades = ledger.recent_trades(10).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].direction, "LONG");
    assert_eq!(trades[0].position_size_usdt, 5_000.0);
    assert_eq!(trades[0].leverage, 5);
    assert_eq!(trades[0].status, "OPEN");

    let analyses = ledger.recent_analyses(10).await.unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].action_taken, "TRADE_EXECUTED");
    assert_eq!(
        analyses[0].market_condition.as_deref(),
        Some("Learned confidence")
    );
}

#[tokio::test]
async fn short_decision_sells_then_exits_buy_side() {
    let short = r#"{
        "direction": "SHORT",
        "recommended_position_size": 0.5,
        "recommended_leverage": 3,
        "stop_loss_percentage": 0.01,
        "take_profit_percentage": 0.02,
        "reasoning": "lower highs on every timeframe"
    }"#;
    let cycle = ExecutionCycle::new(
        ScriptedGateway::flat(50_000.0, 10_000.0),
        ScriptedOracle::new(short),
        StubNews,
        test_ledger().await,
        test_config(),
    );

    assert_eq!(cycle.run_once().await.unwrap(), CycleOutcome::TradeExecuted);
    let calls = cycle.gateway_ref().calls();
    assert_eq!(
        calls,
        vec![
            GatewayCall::SetLeverage(3),
            GatewayCall::MarketOrder(OrderSide::Sell, 0.1),
            GatewayCall::ExitOrder(ExitKind::StopLoss, OrderSide::Buy, 0.1, 50_500.0),
            GatewayCall::ExitOrder(ExitKind::TakeProfit, OrderSide::Buy, 0.1, 49_000.0),
        ]
    );
}

#[tokio::test]
async fn open_position_short_circuits_before_the_oracle() {
    let mut gateway = ScriptedGateway::flat(50_000.0, 10_000.0);
    gateway.position_amt = 0.25;
    let oracle = ScriptedOracle::new(LONG_DECISION);
    let ledger = test_ledger().await;
    let cycle = ExecutionCycle::new(gateway, oracle, StubNews, ledger.clone(), test_config());

    assert_eq!(cycle.run_once().await.unwrap(), CycleOutcome::PositionOpen);
    assert_eq!(cycle.oracle_ref().completions(), 0);
    assert!(cycle.gateway_ref().calls().is_empty());
    assert!(ledger.recent_analyses(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_orders_are_cancelled_when_flat() {
    let mut gateway = ScriptedGateway::flat(50_000.0, 10_000.0);
    gateway.open_orders = vec![
        OpenOrder {
            order_id: 11,
            symbol: "BTCUSDT".to_string(),
        },
        OpenOrder {
            order_id: 12,
            symbol: "BTCUSDT".to_string(),
        },
    ];
    let cycle = ExecutionCycle::new(
        gateway,
        ScriptedOracle::new(LONG_DECISION),
        StubNews,
        test_ledger().await,
        test_config(),
    );

    cycle.run_once().await.unwrap();
    let calls = cycle.gateway_ref().calls();
    assert_eq!(calls[0], GatewayCall::CancelOrder(11));
    assert_eq!(calls[1], GatewayCall::CancelOrder(12));
}

#[tokio::test]
async fn no_position_decision_is_recorded_without_orders() {
    let no_position = r#"{
        "direction": "NO_POSITION",
        "recommended_position_size": 0.0,
        "reasoning": "choppy range, similar setups lost before"
    }"#;
    let ledger = test_ledger().await;
    let cycle = ExecutionCycle::new(
        ScriptedGateway::flat(50_000.0, 10_000.0),
        ScriptedOracle::new(no_position),
        StubNews,
        ledger.clone(),
        test_config(),
    );

    assert_eq!(cycle.run_once().await.unwrap(), CycleOutcome::NoTrade);
    assert!(cycle.gateway_ref().calls().is_empty());
    assert!(ledger.recent_trades(10).await.unwrap().is_empty());

    let analyses = ledger.recent_analyses(10).await.unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].action_taken, "NO_TRADE");
    assert_eq!(
        analyses[0].market_condition.as_deref(),
        Some("Learning from past")
    );
}

#[tokio::test]
async fn undersized_position_is_rejected_not_traded() {
    // balance 500, fraction 0.1 -> 50 USDT, below the 100 USDT minimum
    let small = r#"{
        "direction": "LONG",
        "recommended_position_size": 0.1,
        "recommended_leverage": 2,
        "stop_loss_percentage": 0.01,
        "take_profit_percentage": 0.02,
        "reasoning": "weak signal"
    }"#;
    let ledger = test_ledger().await;
    let cycle = ExecutionCycle::new(
        ScriptedGateway::flat(50_000.0, 500.0),
        ScriptedOracle::new(small),
        StubNews,
        ledger.clone(),
        test_config(),
    );

    assert_eq!(cycle.run_once().await.unwrap(), CycleOutcome::NoTrade);
    assert!(cycle.gateway_ref().calls().is_empty());

    let analyses = ledger.recent_analyses(10).await.unwrap();
    assert_eq!(analyses[0].action_taken, "BELOW_MINIMUM");
    assert_eq!(
        analyses[0].market_condition.as_deref(),
        Some("Position too small")
    );
}

#[tokio::test]
async fn unparseable_response_skips_the_cycle_and_records_it() {
    let ledger = test_ledger().await;
    let cycle = ExecutionCycle::new(
        ScriptedGateway::flat(50_000.0, 10_000.0),
        ScriptedOracle::new("The market looks bullish, I would go long."),
        StubNews,
        ledger.clone(),
        test_config(),
    );

    assert_eq!(cycle.run_once().await.unwrap(), CycleOutcome::Skipped);
    assert!(cycle.gateway_ref().calls().is_empty());
    assert!(ledger.recent_trades(10).await.unwrap().is_empty());

    let analyses = ledger.recent_analyses(10).await.unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].direction, "ERROR");
    assert_eq!(analyses[0].action_taken, "SKIPPED");
    assert!(analyses[0].market_condition.is_none());
    assert!(analyses[0]
        .reasoning
        .as_deref()
        .unwrap_or_default()
        .starts_with("JSON parse error"));
}

#[tokio::test]
async fn consecutive_flat_cycles_each_consult_the_oracle() {
    let no_position = r#"{"direction": "NO_POSITION", "reasoning": "waiting"}"#;
    let cycle = ExecutionCycle::new(
        ScriptedGateway::flat(50_000.0, 10_000.0),
        ScriptedOracle::new(no_position),
        StubNews,
        test_ledger().await,
        test_config(),
    );

    cycle.run_once().await.unwrap();
    cycle.run_once().await.unwrap();
    assert_eq!(cycle.oracle_ref().completions(), 2);
}
