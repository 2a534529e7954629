//! Decision validation and order sizing
//!
//! Pure translation of a raw oracle decision into either a bounded order
//! plan or a no-trade verdict. Rejection (below minimum notional) and
//! adjustment (over-balance reduction) are distinct outcomes: the former
//! aborts with a reason tag, the latter mutates the plan and continues.

use crate::domain::decision::{Direction, OracleDecision};

/// Smallest position the exchange will accept, in quote currency
pub const MIN_NOTIONAL_USDT: f64 = 100.0;

/// Position-size fraction bounds
pub const MIN_FRACTION: f64 = 0.1;
pub const MAX_FRACTION: f64 = 1.0;

/// Leverage bounds
pub const MIN_LEVERAGE: i32 = 1;
pub const MAX_LEVERAGE: i32 = 20;

/// Fraction of balance kept back when the requested size exceeds it
const BALANCE_RESERVE: f64 = 0.95;

/// Why the validator declined to produce an order plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTradeReason {
    /// Oracle chose NO_POSITION or a non-positive size fraction
    NoPosition,
    /// Sized position fell below the exchange minimum notional
    BelowMinimum,
}

/// Concrete, bounded order parameters ready for the gateway
#[derive(Debug, Clone)]
pub struct OrderPlan {
    pub direction: Direction,
    /// Base-asset quantity, truncated to 3 decimals
    pub quantity: f64,
    pub leverage: i32,
    /// Reference price the plan was sized against
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub stop_loss_pct: f64,
    pub take_profit_price: f64,
    pub take_profit_pct: f64,
    pub risk_reward_ratio: f64,
    /// Position value in quote currency before leverage
    pub position_size_quote: f64,
    /// Clamped size fraction actually used
    pub conviction: f64,
}

/// Outcome of validating an oracle decision
#[derive(Debug, Clone)]
pub enum Verdict {
    NoTrade(NoTradeReason),
    Trade(OrderPlan),
}

/// Clamp a position-size fraction into its valid range
pub fn clamp_fraction(fraction: f64) -> f64 {
    fraction.clamp(MIN_FRACTION, MAX_FRACTION)
}

/// Clamp a recommended leverage into valid integer range. Fractional
/// recommendations are truncated toward zero before clamping.
pub fn clamp_leverage(leverage: f64) -> i32 {
    (leverage.trunc() as i64).clamp(MIN_LEVERAGE as i64, MAX_LEVERAGE as i64) as i32
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Translate a raw decision into a bounded order plan or a no-trade verdict.
///
/// Rules are applied in a fixed order: the no-position check runs before
/// any clamping, the minimum-notional check runs on the unreduced size, and
/// the over-balance reduction only applies past that point.
pub fn build_order_plan(
    decision: &OracleDecision,
    available_balance: f64,
    current_price: f64,
) -> Verdict {
    if decision.direction == Direction::NoPosition || decision.position_size_fraction <= 0.0 {
        return Verdict::NoTrade(NoTradeReason::NoPosition);
    }

    let fraction = clamp_fraction(decision.position_size_fraction);
    let leverage = clamp_leverage(decision.leverage);

    let mut position_size_quote = available_balance * fraction;
    if position_size_quote < MIN_NOTIONAL_USDT {
        return Verdict::NoTrade(NoTradeReason::BelowMinimum);
    }

    if position_size_quote > available_balance {
        position_size_quote = available_balance * BALANCE_RESERVE;
    }

    // Exchange lot-size proxy: truncate to 3 decimal places
    let quantity = (position_size_quote / current_price * 1000.0).floor() / 1000.0;

    let (stop_loss_price, take_profit_price) = match decision.direction {
        Direction::Long => (
            round_to_cents(current_price * (1.0 - decision.stop_loss_pct)),
            round_to_cents(current_price * (1.0 + decision.take_profit_pct)),
        ),
        Direction::Short => (
            round_to_cents(current_price * (1.0 + decision.stop_loss_pct)),
            round_to_cents(current_price * (1.0 - decision.take_profit_pct)),
        ),
        Direction::NoPosition => unreachable!("checked above"),
    };

    Verdict::Trade(OrderPlan {
        direction: decision.direction,
        quantity,
        leverage,
        entry_price: current_price,
        stop_loss_price,
        stop_loss_pct: decision.stop_loss_pct,
        take_profit_price,
        take_profit_pct: decision.take_profit_pct,
        risk_reward_ratio: decision.take_profit_pct / decision.stop_loss_pct,
        position_size_quote,
        conviction: fraction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(
        direction: Direction,
        fraction: f64,
        leverage: f64,
        sl: f64,
        tp: f64,
    ) -> OracleDecision {
        OracleDecision {
            direction,
            position_size_fraction: fraction,
            leverage,
            stop_loss_pct: sl,
            take_profit_pct: tp,
            reasoning: "test".to_string(),
        }
    }

    #[test]
    fn test_clamp_fraction_range() {
        assert_eq!(clamp_fraction(0.0), 0.1);
        assert_eq!(clamp_fraction(0.05), 0.1);
        assert_eq!(clamp_fraction(0.1), 0.1);
        assert_eq!(clamp_fraction(0.5), 0.5);
        assert_eq!(clamp_fraction(1.0), 1.0);
        assert_eq!(clamp_fraction(3.0), 1.0);
    }

    #[test]
    fn test_clamp_fraction_idempotent() {
        for f in [-1.0, 0.0, 0.05, 0.1, 0.37, 1.0, 2.5] {
            assert_eq!(clamp_fraction(clamp_fraction(f)), clamp_fraction(f));
        }
    }

    #[test]
    fn test_clamp_fraction_monotonic() {
        let inputs = [-1.0, 0.0, 0.05, 0.1, 0.3, 0.9, 1.0, 1.5];
        for pair in inputs.windows(2) {
            assert!(clamp_fraction(pair[0]) <= clamp_fraction(pair[1]));
        }
    }

    #[test]
    fn test_clamp_leverage_range() {
        assert_eq!(clamp_leverage(-3.0), 1);
        assert_eq!(clamp_leverage(0.0), 1);
        assert_eq!(clamp_leverage(1.0), 1);
        assert_eq!(clamp_leverage(5.7), 5);
        assert_eq!(clamp_leverage(20.0), 20);
        assert_eq!(clamp_leverage(125.0), 20);
    }

    #[test]
    fn test_no_position_wins_over_everything() {
        let d = decision(Direction::NoPosition, 0.5, 5.0, 0.01, 0.02);
        assert!(matches!(
            build_order_plan(&d, 10_000.0, 50_000.0),
            Verdict::NoTrade(NoTradeReason::NoPosition)
        ));
    }

    #[test]
    fn test_zero_fraction_is_no_trade() {
        let d = decision(Direction::Long, 0.0, 5.0, 0.01, 0.02);
        assert!(matches!(
            build_order_plan(&d, 10_000.0, 50_000.0),
            Verdict::NoTrade(NoTradeReason::NoPosition)
        ));
    }

    #[test]
    fn test_small_fraction_clamps_up_to_exact_minimum() {
        // balance 1000, fraction 0.05 -> clamped 0.1 -> notional exactly 100
        let d = decision(Direction::Long, 0.05, 5.0, 0.01, 0.02);
        match build_order_plan(&d, 1000.0, 50_000.0) {
            Verdict::Trade(plan) => {
                assert_eq!(plan.conviction, 0.1);
                assert_eq!(plan.position_size_quote, 100.0);
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn test_notional_just_below_minimum_is_rejected() {
        // balance 999.9, clamped fraction 0.1 -> 99.99 < 100
        let d = decision(Direction::Long, 0.1, 5.0, 0.01, 0.02);
        assert!(matches!(
            build_order_plan(&d, 999.9, 50_000.0),
            Verdict::NoTrade(NoTradeReason::BelowMinimum)
        ));
    }

    #[test]
    fn test_full_balance_takes_no_reserve_haircut() {
        // balance 500, fraction 1.0 -> 500 is not over balance, no 0.95 cut
        let d = decision(Direction::Long, 1.0, 3.0, 0.01, 0.02);
        match build_order_plan(&d, 500.0, 50_000.0) {
            Verdict::Trade(plan) => {
                assert_eq!(plan.position_size_quote, 500.0);
                assert_eq!(plan.quantity, 0.01);
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn test_long_exit_prices_and_risk_reward() {
        let d = decision(Direction::Long, 0.5, 5.0, 0.01, 0.02);
        match build_order_plan(&d, 10_000.0, 50_000.0) {
            Verdict::Trade(plan) => {
                assert_eq!(plan.stop_loss_price, 49_500.00);
                assert_eq!(plan.take_profit_price, 51_000.00);
                assert_eq!(plan.risk_reward_ratio, 2.0);
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn test_short_exit_prices_and_risk_reward() {
        let d = decision(Direction::Short, 0.5, 5.0, 0.01, 0.02);
        match build_order_plan(&d, 10_000.0, 50_000.0) {
            Verdict::Trade(plan) => {
                assert_eq!(plan.stop_loss_price, 50_500.00);
                assert_eq!(plan.take_profit_price, 49_000.00);
                assert_eq!(plan.risk_reward_ratio, 2.0);
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn test_quantity_truncated_to_three_decimals() {
        let d = decision(Direction::Long, 0.5, 5.0, 0.01, 0.02);
        match build_order_plan(&d, 1000.0, 63_211.0) {
            Verdict::Trade(plan) => {
                // 500 / 63211 = 0.0079100... -> 0.007
                assert_eq!(plan.quantity, 0.007);
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn test_leverage_clamped_in_plan() {
        let d = decision(Direction::Long, 0.5, 50.0, 0.01, 0.02);
        match build_order_plan(&d, 10_000.0, 50_000.0) {
            Verdict::Trade(plan) => assert_eq!(plan.leverage, 20),
            other => panic!("expected trade, got {:?}", other),
        }
    }
}
