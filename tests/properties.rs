//! Property tests for the pure AMM engine

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use prediction_market_engine::amm_engine::{compute, PoolAction};
use prediction_market_engine::{MarketId, Outcome, OutcomeId, OutcomePool};
use prediction_market_engine::types::PoolKey;

fn seeded_pool() -> OutcomePool {
    OutcomePool::seeded(
        PoolKey {
            market_id: MarketId(uuid::Uuid::nil()),
            outcome_id: OutcomeId(uuid::Uuid::nil()),
        },
        dec!(2000),
        dec!(100),
    )
}

fn arb_side() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Yes), Just(Outcome::No)]
}

/// Cash/token amounts between 0.01 and 1000.00
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=100_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn relative_diff(a: Decimal, b: Decimal) -> Decimal {
    (a - b).abs() / b
}

proptest! {
    /// Any sequence of buys and sells keeps the reserve product on the
    /// invariant and the two prices summing to one.
    #[test]
    fn trades_preserve_the_constant_product(
        ops in prop::collection::vec((any::<bool>(), arb_side(), arb_amount()), 1..40)
    ) {
        let mut pool = seeded_pool();
        let k = pool.invariant_k;
        let mut yes_held = Decimal::ZERO;
        let mut no_held = Decimal::ZERO;

        for (is_buy, side, amount) in ops {
            if is_buy {
                let t = compute(&pool, PoolAction::Buy { side, amount_usd: amount }).unwrap();
                match side {
                    Outcome::Yes => yes_held += t.ledger_delta.yes,
                    Outcome::No => no_held += t.ledger_delta.no,
                }
                pool = t.pool_after;
            } else {
                // Sell at most what the walk has accumulated
                let held = match side {
                    Outcome::Yes => yes_held,
                    Outcome::No => no_held,
                };
                let amount = amount.min(held);
                if amount < dec!(0.01) {
                    continue;
                }
                let t = compute(&pool, PoolAction::Sell { side, amount_tokens: amount }).unwrap();
                match side {
                    Outcome::Yes => yes_held -= amount,
                    Outcome::No => no_held -= amount,
                }
                pool = t.pool_after;
            }

            prop_assert!(
                relative_diff(pool.yes_reserve * pool.no_reserve, k) < dec!(0.0000001),
                "product {} drifted from invariant {}",
                pool.yes_reserve * pool.no_reserve,
                k
            );
            let price_sum = pool.price(Outcome::Yes) + pool.price(Outcome::No);
            prop_assert!((price_sum - dec!(1)).abs() < dec!(0.0000001));
            prop_assert!(pool.yes_reserve > Decimal::ZERO);
            prop_assert!(pool.no_reserve > Decimal::ZERO);
        }
    }

    /// Volume accumulates and never decreases over any trade sequence.
    #[test]
    fn volume_is_monotone(
        ops in prop::collection::vec((arb_side(), arb_amount()), 1..30)
    ) {
        let mut pool = seeded_pool();
        let mut last_volume = Decimal::ZERO;
        for (side, amount) in ops {
            let t = compute(&pool, PoolAction::Buy { side, amount_usd: amount }).unwrap();
            pool = t.pool_after;
            prop_assert!(pool.volume >= last_volume);
            last_volume = pool.volume;
        }
    }

    /// A mint followed by a redeem of the same size is cash- and
    /// token-neutral.
    #[test]
    fn mint_redeem_round_trip(amount in arb_amount()) {
        let pool = seeded_pool();
        let minted = compute(&pool, PoolAction::Mint { amount_usd: amount }).unwrap();
        let redeemed = compute(&minted.pool_after, PoolAction::Redeem { amount }).unwrap();

        prop_assert_eq!(minted.cash_delta + redeemed.cash_delta, Decimal::ZERO);
        prop_assert_eq!(
            minted.ledger_delta.yes + redeemed.ledger_delta.yes,
            Decimal::ZERO
        );
        prop_assert_eq!(
            minted.ledger_delta.no + redeemed.ledger_delta.no,
            Decimal::ZERO
        );
        // Neither direction touches the pool
        prop_assert_eq!(&minted.pool_after, &pool);
        prop_assert_eq!(&redeemed.pool_after, &pool);
    }

    /// Selling exactly the tokens a buy produced restores the reserves and
    /// refunds the spend, modulo rounding.
    #[test]
    fn buy_then_sell_is_symmetric(side in arb_side(), amount in arb_amount()) {
        let pool = seeded_pool();
        let bought = compute(&pool, PoolAction::Buy { side, amount_usd: amount }).unwrap();
        let tokens = match side {
            Outcome::Yes => bought.ledger_delta.yes,
            Outcome::No => bought.ledger_delta.no,
        };
        let sold = compute(
            &bought.pool_after,
            PoolAction::Sell { side, amount_tokens: tokens },
        )
        .unwrap();

        prop_assert!((sold.cash_delta - amount).abs() < dec!(0.000001));
        prop_assert!((sold.pool_after.yes_reserve - pool.yes_reserve).abs() < dec!(0.000001));
        prop_assert!((sold.pool_after.no_reserve - pool.no_reserve).abs() < dec!(0.000001));
    }

    /// Adding liquidity leaves the price untouched and grows shares in
    /// proportion to the contribution.
    #[test]
    fn add_liquidity_keeps_the_price(amount in arb_amount()) {
        let pool = seeded_pool();
        let t = compute(&pool, PoolAction::AddLiquidity { amount_yes: amount }).unwrap();

        prop_assert_eq!(t.pool_after.price(Outcome::Yes), pool.price(Outcome::Yes));
        prop_assert!(t.pool_after.liquidity_shares_outstanding > pool.liquidity_shares_outstanding);
        // Shares minted match the fractional growth of the YES reserve
        let expected = amount / pool.yes_reserve * pool.liquidity_shares_outstanding;
        prop_assert_eq!(t.ledger_delta.liquidity_shares, expected);
    }

    /// Removing liquidity then re-adding the returned YES leg restores the
    /// share supply within rounding.
    #[test]
    fn remove_then_add_liquidity_round_trips(shares in (1i64..=9_000).prop_map(|c| Decimal::new(c, 2))) {
        let pool = seeded_pool();
        let removed = compute(&pool, PoolAction::RemoveLiquidity { shares }).unwrap();
        let re_added = compute(
            &removed.pool_after,
            PoolAction::AddLiquidity { amount_yes: removed.ledger_delta.yes },
        )
        .unwrap();

        prop_assert!(
            relative_diff(
                re_added.pool_after.liquidity_shares_outstanding,
                pool.liquidity_shares_outstanding
            ) < dec!(0.0000001)
        );
        prop_assert!(
            relative_diff(re_added.pool_after.yes_reserve, pool.yes_reserve) < dec!(0.0000001)
        );
    }
}
