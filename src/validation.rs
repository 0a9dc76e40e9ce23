//! Precondition checks applied before the AMM engine runs
//!
//! The engine assumes ownership preconditions hold; every rejection here
//! names the precondition that failed and is never retried.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::amm_engine::PoolAction;
use crate::error::{EngineError, Result};
use crate::types::{LedgerEntry, Market, MarketStatus, Outcome, OutcomePool, UserAccount};

/// Reject non-positive amounts before anything else looks at the action
pub fn check_amount(action: &PoolAction) -> Result<()> {
    let amount = action.amount();
    if amount <= Decimal::ZERO {
        return Err(EngineError::validation(
            "amount",
            format!("must be positive, got {}", amount),
        ));
    }
    Ok(())
}

/// Gate actions on market lifecycle and expiry.
///
/// A closed or resolving market rejects everything. Past expiry (when
/// enforcement is on), position-opening actions are rejected while exits
/// remain allowed so holders are never trapped.
pub fn check_market_open(
    market: &Market,
    action: &PoolAction,
    now: DateTime<Utc>,
    enforce_expiry: bool,
) -> Result<()> {
    if market.status != MarketStatus::Open {
        return Err(EngineError::MarketClosed(market.id));
    }
    if enforce_expiry && market.is_expired_at(now) && opens_position(action) {
        return Err(EngineError::MarketExpired {
            market_id: market.id,
            expired_at: market.expires_at,
        });
    }
    Ok(())
}

fn opens_position(action: &PoolAction) -> bool {
    matches!(
        action,
        PoolAction::Buy { .. } | PoolAction::Mint { .. } | PoolAction::AddLiquidity { .. }
    )
}

/// Verify the caller owns what the action consumes
pub fn check_ownership(
    action: &PoolAction,
    pool: &OutcomePool,
    ledger: &LedgerEntry,
    account: &UserAccount,
) -> Result<()> {
    match *action {
        PoolAction::Buy { amount_usd, .. } => require_cash(account, amount_usd),
        PoolAction::Mint { amount_usd } => require_cash(account, amount_usd),
        PoolAction::Sell { side, amount_tokens } => require_tokens(ledger, side, amount_tokens),
        PoolAction::Redeem { amount } => {
            require_tokens(ledger, Outcome::Yes, amount)?;
            require_tokens(ledger, Outcome::No, amount)
        }
        PoolAction::AddLiquidity { amount_yes } => {
            if pool.yes_reserve <= Decimal::ZERO || pool.no_reserve <= Decimal::ZERO {
                return Err(EngineError::validation(
                    "reserves",
                    format!("pool {} has no liquidity to match against", pool.key),
                ));
            }
            // The NO leg is dictated by the current reserve ratio
            let amount_no = amount_yes * pool.no_reserve / pool.yes_reserve;
            require_tokens(ledger, Outcome::Yes, amount_yes)?;
            require_tokens(ledger, Outcome::No, amount_no)
        }
        PoolAction::RemoveLiquidity { shares } => require_shares(ledger, shares),
    }
}

fn require_cash(account: &UserAccount, required: Decimal) -> Result<()> {
    if account.cash_balance < required {
        return Err(EngineError::InsufficientFunds {
            required,
            available: account.cash_balance,
        });
    }
    Ok(())
}

fn require_tokens(ledger: &LedgerEntry, side: Outcome, required: Decimal) -> Result<()> {
    let available = ledger.balance(side);
    if available < required {
        return Err(EngineError::InsufficientTokens {
            side,
            required,
            available,
        });
    }
    Ok(())
}

fn require_shares(ledger: &LedgerEntry, required: Decimal) -> Result<()> {
    if ledger.liquidity_shares < required {
        return Err(EngineError::InsufficientShares {
            required,
            available: ledger.liquidity_shares,
        });
    }
    Ok(())
}
