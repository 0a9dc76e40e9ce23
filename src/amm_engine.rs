//! Constant-product AMM state transitions for binary outcome pools
//!
//! Pure computation: given a pool snapshot and an action, produce the pool
//! post-state plus the deltas to apply to the caller's ledger and cash
//! balance. Nothing here touches storage; ownership preconditions (enough
//! cash, tokens or shares) are checked by the caller before invoking the
//! engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{EngineError, Result};
use crate::types::{AuditKind, Outcome, OutcomePool, TradeDirection};

/// Closed set of pool actions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PoolAction {
    /// Spend `amount_usd` cash for tokens of `side`
    Buy { side: Outcome, amount_usd: Decimal },
    /// Surrender `amount_tokens` of `side` back to the pool for cash
    Sell { side: Outcome, amount_tokens: Decimal },
    /// Pay `amount_usd` cash for `amount_usd` of both YES and NO tokens
    Mint { amount_usd: Decimal },
    /// Burn `amount` of both sides, credit `amount` cash
    Redeem { amount: Decimal },
    /// Contribute tokens at the current pool ratio, denominated in YES tokens
    AddLiquidity { amount_yes: Decimal },
    /// Redeem a pro-rata share of the reserves
    RemoveLiquidity { shares: Decimal },
}

impl PoolAction {
    /// The user-supplied amount, whatever its unit
    pub fn amount(&self) -> Decimal {
        match *self {
            PoolAction::Buy { amount_usd, .. } => amount_usd,
            PoolAction::Sell { amount_tokens, .. } => amount_tokens,
            PoolAction::Mint { amount_usd } => amount_usd,
            PoolAction::Redeem { amount } => amount,
            PoolAction::AddLiquidity { amount_yes } => amount_yes,
            PoolAction::RemoveLiquidity { shares } => shares,
        }
    }

    pub fn kind(&self) -> AuditKind {
        match self {
            PoolAction::Buy { .. } | PoolAction::Sell { .. } => AuditKind::Trade,
            PoolAction::Mint { .. } => AuditKind::Mint,
            PoolAction::Redeem { .. } => AuditKind::Redeem,
            PoolAction::AddLiquidity { .. } => AuditKind::AddLiquidity,
            PoolAction::RemoveLiquidity { .. } => AuditKind::RemoveLiquidity,
        }
    }
}

/// Increments to apply to the caller's ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub yes: Decimal,
    pub no: Decimal,
    pub liquidity_shares: Decimal,
}

/// Audit fields computed alongside the transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFields {
    pub kind: AuditKind,
    pub direction: Option<TradeDirection>,
    pub side: Option<Outcome>,
    /// Token quantity moved
    pub quantity: Decimal,
    /// Cash quantity moved
    pub quantity_usd: Decimal,
    /// Post-trade price of the traded side
    pub price: Option<Decimal>,
    /// Per-leg breakdown for liquidity events
    pub details: Option<serde_json::Value>,
}

/// An engine-computed transition, not yet applied anywhere
#[derive(Debug, Clone)]
pub struct Transition {
    pub pool_after: OutcomePool,
    pub ledger_delta: LedgerDelta,
    /// Signed change to the caller's cash balance
    pub cash_delta: Decimal,
    pub audit: AuditFields,
}

/// Compute the state transition for `action` against `pool`
pub fn compute(pool: &OutcomePool, action: PoolAction) -> Result<Transition> {
    match action {
        PoolAction::Buy { side, amount_usd } => buy(pool, side, amount_usd),
        PoolAction::Sell { side, amount_tokens } => sell(pool, side, amount_tokens),
        PoolAction::Mint { amount_usd } => mint(pool, amount_usd),
        PoolAction::Redeem { amount } => redeem(pool, amount),
        PoolAction::AddLiquidity { amount_yes } => add_liquidity(pool, amount_yes),
        PoolAction::RemoveLiquidity { shares } => remove_liquidity(pool, shares),
    }
}

fn ensure_positive_reserves(pool: &OutcomePool) -> Result<()> {
    if pool.yes_reserve <= Decimal::ZERO || pool.no_reserve <= Decimal::ZERO {
        return Err(EngineError::validation(
            "reserves",
            format!(
                "pool {} has non-positive reserves ({} YES / {} NO)",
                pool.key, pool.yes_reserve, pool.no_reserve
            ),
        ));
    }
    Ok(())
}

fn set_reserves(pool: &mut OutcomePool, side: Outcome, same: Decimal, opposite: Decimal) {
    match side {
        Outcome::Yes => {
            pool.yes_reserve = same;
            pool.no_reserve = opposite;
        }
        Outcome::No => {
            pool.no_reserve = same;
            pool.yes_reserve = opposite;
        }
    }
}

/// Cash is added entirely to the opposite-outcome leg of the pool; the
/// bought side is recomputed from the invariant and the difference is
/// minted to the user.
fn buy(pool: &OutcomePool, side: Outcome, amount_usd: Decimal) -> Result<Transition> {
    ensure_positive_reserves(pool)?;

    let opposite = pool.reserve(side.opposite()) + amount_usd;
    let same = pool.invariant_k / opposite;
    let tokens_out = pool.reserve(side) - same;

    let mut pool_after = pool.clone();
    set_reserves(&mut pool_after, side, same, opposite);
    pool_after.volume += amount_usd;

    let mut ledger_delta = LedgerDelta::default();
    match side {
        Outcome::Yes => ledger_delta.yes = tokens_out,
        Outcome::No => ledger_delta.no = tokens_out,
    }

    let price = pool_after.price(side);
    Ok(Transition {
        pool_after,
        ledger_delta,
        cash_delta: -amount_usd,
        audit: AuditFields {
            kind: AuditKind::Trade,
            direction: Some(TradeDirection::Buy),
            side: Some(side),
            quantity: tokens_out,
            quantity_usd: amount_usd,
            price: Some(price),
            details: None,
        },
    })
}

/// The pool absorbs the surrendered tokens; the payout comes out of the
/// opposite-leg reserve so that `(same + amount)(opposite - payout) = k`
/// holds. This is the exact inverse of `buy`.
fn sell(pool: &OutcomePool, side: Outcome, amount_tokens: Decimal) -> Result<Transition> {
    ensure_positive_reserves(pool)?;

    let same = pool.reserve(side) + amount_tokens;
    let opposite = pool.invariant_k / same;
    let payout = pool.reserve(side.opposite()) - opposite;
    if payout <= Decimal::ZERO {
        return Err(EngineError::InsufficientLiquidity { payout });
    }

    let mut pool_after = pool.clone();
    set_reserves(&mut pool_after, side, same, opposite);
    pool_after.volume += payout;

    let mut ledger_delta = LedgerDelta::default();
    match side {
        Outcome::Yes => ledger_delta.yes = -amount_tokens,
        Outcome::No => ledger_delta.no = -amount_tokens,
    }

    let price = pool_after.price(side);
    Ok(Transition {
        pool_after,
        ledger_delta,
        cash_delta: payout,
        audit: AuditFields {
            kind: AuditKind::Trade,
            direction: Some(TradeDirection::Sell),
            side: Some(side),
            quantity: amount_tokens,
            quantity_usd: payout,
            price: Some(price),
            details: None,
        },
    })
}

/// A complete set is always worth exactly one unit of cash, so minting
/// bypasses the pool entirely.
fn mint(pool: &OutcomePool, amount_usd: Decimal) -> Result<Transition> {
    Ok(Transition {
        pool_after: pool.clone(),
        ledger_delta: LedgerDelta {
            yes: amount_usd,
            no: amount_usd,
            liquidity_shares: Decimal::ZERO,
        },
        cash_delta: -amount_usd,
        audit: AuditFields {
            kind: AuditKind::Mint,
            direction: None,
            side: None,
            quantity: amount_usd,
            quantity_usd: amount_usd,
            price: None,
            details: None,
        },
    })
}

fn redeem(pool: &OutcomePool, amount: Decimal) -> Result<Transition> {
    Ok(Transition {
        pool_after: pool.clone(),
        ledger_delta: LedgerDelta {
            yes: -amount,
            no: -amount,
            liquidity_shares: Decimal::ZERO,
        },
        cash_delta: amount,
        audit: AuditFields {
            kind: AuditKind::Redeem,
            direction: None,
            side: None,
            quantity: amount,
            quantity_usd: amount,
            price: None,
            details: None,
        },
    })
}

/// Contributions must match the current reserve ratio so the price is
/// unchanged; `invariant_k` is recomputed from the grown reserves.
fn add_liquidity(pool: &OutcomePool, amount_yes: Decimal) -> Result<Transition> {
    ensure_positive_reserves(pool)?;

    let amount_no = amount_yes * pool.no_reserve / pool.yes_reserve;
    let shares_minted =
        amount_yes / pool.yes_reserve * pool.liquidity_shares_outstanding;

    let mut pool_after = pool.clone();
    pool_after.yes_reserve += amount_yes;
    pool_after.no_reserve += amount_no;
    pool_after.invariant_k = pool_after.yes_reserve * pool_after.no_reserve;
    pool_after.liquidity_shares_outstanding += shares_minted;

    Ok(Transition {
        pool_after,
        ledger_delta: LedgerDelta {
            yes: -amount_yes,
            no: -amount_no,
            liquidity_shares: shares_minted,
        },
        cash_delta: Decimal::ZERO,
        audit: AuditFields {
            kind: AuditKind::AddLiquidity,
            direction: None,
            side: None,
            quantity: shares_minted,
            quantity_usd: Decimal::ZERO,
            price: None,
            details: Some(json!({
                "quantity_yes": amount_yes,
                "quantity_no": amount_no,
                "liquidity_shares": shares_minted,
            })),
        },
    })
}

fn remove_liquidity(pool: &OutcomePool, shares: Decimal) -> Result<Transition> {
    ensure_positive_reserves(pool)?;
    if shares > pool.liquidity_shares_outstanding {
        return Err(EngineError::InsufficientShares {
            required: shares,
            available: pool.liquidity_shares_outstanding,
        });
    }

    let fraction = shares / pool.liquidity_shares_outstanding;
    let yes_out = fraction * pool.yes_reserve;
    let no_out = fraction * pool.no_reserve;

    let mut pool_after = pool.clone();
    pool_after.yes_reserve -= yes_out;
    pool_after.no_reserve -= no_out;
    pool_after.invariant_k = pool_after.yes_reserve * pool_after.no_reserve;
    pool_after.liquidity_shares_outstanding -= shares;

    Ok(Transition {
        pool_after,
        ledger_delta: LedgerDelta {
            yes: yes_out,
            no: no_out,
            liquidity_shares: -shares,
        },
        cash_delta: Decimal::ZERO,
        audit: AuditFields {
            kind: AuditKind::RemoveLiquidity,
            direction: None,
            side: None,
            quantity: shares,
            quantity_usd: Decimal::ZERO,
            price: None,
            details: Some(json!({
                "quantity_yes": yes_out,
                "quantity_no": no_out,
                "liquidity_shares": shares,
            })),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketId, OutcomeId, PoolKey};
    use rust_decimal_macros::dec;

    fn seeded_pool() -> OutcomePool {
        OutcomePool::seeded(
            PoolKey {
                market_id: MarketId::new(),
                outcome_id: OutcomeId::new(),
            },
            dec!(2000),
            dec!(100),
        )
    }

    fn assert_close(a: Decimal, b: Decimal, tolerance: Decimal) {
        assert!(
            (a - b).abs() < tolerance,
            "expected {} ~= {} (tolerance {})",
            a,
            b,
            tolerance
        );
    }

    #[test]
    fn test_buy_yes_moves_reserves_along_the_curve() {
        // 2000/2000 pool, buy 1000 USD of YES:
        // no' = 3000, yes' = 4,000,000/3000 = 1333.33, ~666.67 tokens out
        let pool = seeded_pool();
        let t = compute(
            &pool,
            PoolAction::Buy {
                side: Outcome::Yes,
                amount_usd: dec!(1000),
            },
        )
        .unwrap();

        assert_eq!(t.pool_after.no_reserve, dec!(3000));
        assert_close(t.pool_after.yes_reserve, dec!(1333.3333), dec!(0.001));
        assert_close(t.ledger_delta.yes, dec!(666.6667), dec!(0.001));
        assert_eq!(t.ledger_delta.no, Decimal::ZERO);
        assert_eq!(t.cash_delta, dec!(-1000));
        assert_eq!(t.pool_after.volume, dec!(1000));

        // Constant product holds across the trade
        assert_close(
            t.pool_after.yes_reserve * t.pool_after.no_reserve,
            pool.invariant_k,
            dec!(0.001),
        );
    }

    #[test]
    fn test_buy_no_is_symmetric() {
        let pool = seeded_pool();
        let t = compute(
            &pool,
            PoolAction::Buy {
                side: Outcome::No,
                amount_usd: dec!(1000),
            },
        )
        .unwrap();

        assert_eq!(t.pool_after.yes_reserve, dec!(3000));
        assert_close(t.pool_after.no_reserve, dec!(1333.3333), dec!(0.001));
        assert_close(t.ledger_delta.no, dec!(666.6667), dec!(0.001));
        assert_eq!(t.ledger_delta.yes, Decimal::ZERO);
    }

    #[test]
    fn test_sell_reverses_a_buy() {
        // Buy 1000 USD of YES, then sell the tokens back: the pool returns
        // to its seed state and the refund is the original 1000 (modulo
        // rounding).
        let pool = seeded_pool();
        let bought = compute(
            &pool,
            PoolAction::Buy {
                side: Outcome::Yes,
                amount_usd: dec!(1000),
            },
        )
        .unwrap();

        let sold = compute(
            &bought.pool_after,
            PoolAction::Sell {
                side: Outcome::Yes,
                amount_tokens: bought.ledger_delta.yes,
            },
        )
        .unwrap();

        assert_close(sold.pool_after.yes_reserve, dec!(2000), dec!(0.001));
        assert_close(sold.pool_after.no_reserve, dec!(2000), dec!(0.001));
        assert_close(sold.cash_delta, dec!(1000), dec!(0.001));
        assert_close(
            sold.pool_after.yes_reserve * sold.pool_after.no_reserve,
            pool.invariant_k,
            dec!(0.001),
        );
    }

    #[test]
    fn test_sell_payout_is_positive_and_bounded() {
        let pool = seeded_pool();
        let t = compute(
            &pool,
            PoolAction::Sell {
                side: Outcome::No,
                amount_tokens: dec!(500),
            },
        )
        .unwrap();

        assert!(t.cash_delta > Decimal::ZERO);
        assert!(t.cash_delta < pool.yes_reserve);
        assert_eq!(t.ledger_delta.no, dec!(-500));
        assert_eq!(t.pool_after.volume, t.cash_delta);
    }

    #[test]
    fn test_prices_sum_to_one_after_trades() {
        let pool = seeded_pool();
        let t = compute(
            &pool,
            PoolAction::Buy {
                side: Outcome::Yes,
                amount_usd: dec!(750),
            },
        )
        .unwrap();
        let sum = t.pool_after.price(Outcome::Yes) + t.pool_after.price(Outcome::No);
        assert_close(sum, dec!(1), dec!(0.0000001));
    }

    #[test]
    fn test_mint_redeem_round_trip_is_neutral() {
        let pool = seeded_pool();
        let minted = compute(&pool, PoolAction::Mint { amount_usd: dec!(250) }).unwrap();
        assert_eq!(minted.ledger_delta.yes, dec!(250));
        assert_eq!(minted.ledger_delta.no, dec!(250));
        assert_eq!(minted.cash_delta, dec!(-250));
        // Pool untouched
        assert_eq!(minted.pool_after, pool);

        let redeemed = compute(&pool, PoolAction::Redeem { amount: dec!(250) }).unwrap();
        assert_eq!(redeemed.ledger_delta.yes + minted.ledger_delta.yes, Decimal::ZERO);
        assert_eq!(redeemed.cash_delta + minted.cash_delta, Decimal::ZERO);
    }

    #[test]
    fn test_add_liquidity_preserves_ratio() {
        // 2000/2000 pool with 100 shares: contributing 200 YES requires
        // 200 NO and mints 10 shares.
        let pool = seeded_pool();
        let t = compute(&pool, PoolAction::AddLiquidity { amount_yes: dec!(200) }).unwrap();

        assert_eq!(t.pool_after.yes_reserve, dec!(2200));
        assert_eq!(t.pool_after.no_reserve, dec!(2200));
        assert_eq!(t.pool_after.liquidity_shares_outstanding, dec!(110));
        assert_eq!(t.pool_after.invariant_k, dec!(2200) * dec!(2200));
        assert_eq!(t.ledger_delta.yes, dec!(-200));
        assert_eq!(t.ledger_delta.no, dec!(-200));
        assert_eq!(t.ledger_delta.liquidity_shares, dec!(10));
        assert_eq!(t.cash_delta, Decimal::ZERO);

        // Price unchanged by a ratio-preserving contribution
        assert_eq!(t.pool_after.price(Outcome::Yes), pool.price(Outcome::Yes));
    }

    #[test]
    fn test_add_liquidity_on_skewed_pool() {
        let mut pool = seeded_pool();
        pool.yes_reserve = dec!(1000);
        pool.no_reserve = dec!(4000);
        pool.invariant_k = dec!(4000000);

        let t = compute(&pool, PoolAction::AddLiquidity { amount_yes: dec!(100) }).unwrap();
        assert_eq!(t.ledger_delta.no, dec!(-400));
        assert_eq!(t.pool_after.yes_reserve, dec!(1100));
        assert_eq!(t.pool_after.no_reserve, dec!(4400));
        assert_eq!(t.ledger_delta.liquidity_shares, dec!(10));
    }

    #[test]
    fn test_remove_liquidity_pro_rata() {
        let pool = seeded_pool();
        let t = compute(&pool, PoolAction::RemoveLiquidity { shares: dec!(25) }).unwrap();

        assert_eq!(t.ledger_delta.yes, dec!(500));
        assert_eq!(t.ledger_delta.no, dec!(500));
        assert_eq!(t.ledger_delta.liquidity_shares, dec!(-25));
        assert_eq!(t.pool_after.yes_reserve, dec!(1500));
        assert_eq!(t.pool_after.liquidity_shares_outstanding, dec!(75));
        assert_eq!(t.pool_after.invariant_k, dec!(1500) * dec!(1500));
    }

    #[test]
    fn test_remove_more_shares_than_outstanding_is_rejected() {
        let pool = seeded_pool();
        let err = compute(&pool, PoolAction::RemoveLiquidity { shares: dec!(101) }).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientShares { .. }));
    }

    #[test]
    fn test_liquidity_events_preserve_price_not_k() {
        let pool = seeded_pool();
        let t = compute(&pool, PoolAction::AddLiquidity { amount_yes: dec!(500) }).unwrap();
        // k grows with the reserves; the reserve ratio (and thus price) does not move
        assert!(t.pool_after.invariant_k > pool.invariant_k);
        assert_eq!(t.pool_after.price(Outcome::No), pool.price(Outcome::No));
    }

    #[test]
    fn test_degenerate_pool_is_rejected() {
        let mut pool = seeded_pool();
        pool.no_reserve = Decimal::ZERO;
        let err = compute(
            &pool,
            PoolAction::Buy {
                side: Outcome::Yes,
                amount_usd: dec!(10),
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }
}
