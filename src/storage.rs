//! Async storage abstraction and the in-memory reference backend
//!
//! The AMM engine only computes transitions; this layer owns the records.
//! The trait exposes plain reads plus coarse-grained commit operations that
//! each apply as a single atomic unit. The in-memory backend applies every
//! commit under one write lock, so a failed commit leaves no partial state
//! behind and concurrent readers never observe a half-applied settlement.
//! Ledger and cash changes are applied as increments, checked against
//! non-negativity at commit time; the pool carries an optimistic version
//! token checked on every settlement write.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::amm_engine::LedgerDelta;
use crate::error::{EngineError, Result};
use crate::types::{
    AuditKind, AuditRecord, LedgerEntry, LedgerKey, Market, MarketId, MarketStatus, Outcome,
    OutcomePool, PoolKey, PricePoint, UserAccount, UserId,
};

/// Bound a storage operation; an elapsed timeout surfaces as a retryable error
pub async fn with_timeout<T>(
    limit: std::time::Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::StorageTimeout(limit)),
    }
}

/// Pool snapshot paired with its optimistic-concurrency token
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedPool {
    pub version: u64,
    pub pool: OutcomePool,
}

/// One settlement, applied all-or-nothing
#[derive(Debug, Clone)]
pub struct SettlementWrite {
    /// Version the pool was read at; a mismatch fails the whole write
    pub expected_version: u64,
    /// Pool post-state computed by the engine
    pub pool: OutcomePool,
    pub ledger_key: LedgerKey,
    pub ledger_delta: LedgerDelta,
    /// Signed change to the user's cash balance
    pub cash_delta: Decimal,
    pub audit: AuditRecord,
}

/// One resolution payout, applied all-or-nothing
#[derive(Debug, Clone)]
pub struct PayoutWrite {
    pub ledger_key: LedgerKey,
    pub cash_credit: Decimal,
    /// Absent for degenerate zero-balance holders, whose entries are
    /// dropped without a payout record
    pub audit: Option<AuditRecord>,
}

/// Storage interface consumed by the services
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Insert a market together with its seeded outcome pools
    async fn insert_market(&self, market: Market, pools: Vec<OutcomePool>) -> Result<()>;

    async fn market(&self, market_id: MarketId) -> Result<Market>;

    async fn open_markets(&self) -> Result<Vec<Market>>;

    async fn set_market_status(&self, market_id: MarketId, status: MarketStatus) -> Result<()>;

    async fn pool(&self, key: &PoolKey) -> Result<VersionedPool>;

    async fn account(&self, user_id: UserId) -> Result<UserAccount>;

    /// Credit cash, creating the account on first deposit
    async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<UserAccount>;

    /// Debit cash, atomically rejecting an overdraft
    async fn withdraw(&self, user_id: UserId, amount: Decimal) -> Result<UserAccount>;

    async fn ledger_entry(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>>;

    /// All ledger entries referencing one outcome pool
    async fn pool_holders(&self, pool: &PoolKey) -> Result<Vec<LedgerEntry>>;

    /// Post-trade price series of one pool, oldest first
    async fn price_chart(&self, pool: &PoolKey) -> Result<Vec<PricePoint>>;

    /// Apply one settlement as a single atomic unit
    async fn commit_settlement(&self, write: SettlementWrite) -> Result<()>;

    /// Apply one resolution payout atomically. Returns `false` without
    /// writing anything if the ledger entry is already gone, which makes
    /// an interrupted resolution safely re-runnable.
    async fn commit_payout(&self, write: PayoutWrite) -> Result<bool>;

    async fn audit_records(&self, user_id: UserId) -> Result<Vec<AuditRecord>>;
}

#[derive(Default)]
struct Inner {
    markets: HashMap<MarketId, Market>,
    pools: HashMap<PoolKey, VersionedPool>,
    accounts: HashMap<UserId, UserAccount>,
    ledgers: HashMap<LedgerKey, LedgerEntry>,
    price_charts: HashMap<PoolKey, Vec<PricePoint>>,
    audit_log: Vec<AuditRecord>,
}

/// In-memory reference backend
#[derive(Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// A negative result after validation means another writer got in between
// the read and this commit; the settlement loop retries with fresh state.
fn apply_delta(current: Decimal, delta: Decimal, key: &LedgerKey) -> Result<Decimal> {
    let next = current + delta;
    if next < Decimal::ZERO {
        return Err(EngineError::Conflict {
            market_id: key.pool.market_id,
            outcome_id: key.pool.outcome_id,
            expected: 0,
            actual: 0,
        });
    }
    Ok(next)
}

#[async_trait]
impl ExchangeStore for InMemoryStore {
    async fn insert_market(&self, market: Market, pools: Vec<OutcomePool>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for pool in pools {
            inner
                .pools
                .insert(pool.key, VersionedPool { version: 0, pool });
        }
        inner.markets.insert(market.id, market);
        Ok(())
    }

    async fn market(&self, market_id: MarketId) -> Result<Market> {
        let inner = self.inner.read().await;
        inner
            .markets
            .get(&market_id)
            .cloned()
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    async fn open_markets(&self) -> Result<Vec<Market>> {
        let inner = self.inner.read().await;
        Ok(inner
            .markets
            .values()
            .filter(|m| m.status == MarketStatus::Open)
            .cloned()
            .collect())
    }

    async fn set_market_status(&self, market_id: MarketId, status: MarketStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let market = inner
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        market.status = status;
        Ok(())
    }

    async fn pool(&self, key: &PoolKey) -> Result<VersionedPool> {
        let inner = self.inner.read().await;
        inner
            .pools
            .get(key)
            .cloned()
            .ok_or(EngineError::PoolNotFound {
                market_id: key.market_id,
                outcome_id: key.outcome_id,
            })
    }

    async fn account(&self, user_id: UserId) -> Result<UserAccount> {
        let inner = self.inner.read().await;
        inner
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or(EngineError::AccountNotFound(user_id))
    }

    async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<UserAccount> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| UserAccount::new(user_id));
        account.cash_balance += amount;
        account.cumulative_deposited += amount;
        Ok(account.clone())
    }

    async fn withdraw(&self, user_id: UserId, amount: Decimal) -> Result<UserAccount> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&user_id)
            .ok_or(EngineError::AccountNotFound(user_id))?;
        if account.cash_balance < amount {
            return Err(EngineError::InsufficientFunds {
                required: amount,
                available: account.cash_balance,
            });
        }
        account.cash_balance -= amount;
        account.cumulative_withdrawn += amount;
        Ok(account.clone())
    }

    async fn ledger_entry(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.ledgers.get(key).cloned())
    }

    async fn pool_holders(&self, pool: &PoolKey) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ledgers
            .values()
            .filter(|entry| entry.key.pool == *pool)
            .cloned()
            .collect())
    }

    async fn price_chart(&self, pool: &PoolKey) -> Result<Vec<PricePoint>> {
        let inner = self.inner.read().await;
        Ok(inner.price_charts.get(pool).cloned().unwrap_or_default())
    }

    async fn commit_settlement(&self, write: SettlementWrite) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Stale read of the pool fails the whole write
        let current = inner
            .pools
            .get(&write.pool.key)
            .ok_or(EngineError::PoolNotFound {
                market_id: write.pool.key.market_id,
                outcome_id: write.pool.key.outcome_id,
            })?;
        if current.version != write.expected_version {
            return Err(EngineError::Conflict {
                market_id: write.pool.key.market_id,
                outcome_id: write.pool.key.outcome_id,
                expected: write.expected_version,
                actual: current.version,
            });
        }
        let volume_delta = write.pool.volume - current.pool.volume;

        // Stage the ledger and account post-states before mutating anything
        let ledger_before = inner
            .ledgers
            .get(&write.ledger_key)
            .cloned()
            .unwrap_or_else(|| LedgerEntry::empty(write.ledger_key));
        let mut ledger_after = ledger_before;
        ledger_after.yes_balance =
            apply_delta(ledger_after.yes_balance, write.ledger_delta.yes, &write.ledger_key)?;
        ledger_after.no_balance =
            apply_delta(ledger_after.no_balance, write.ledger_delta.no, &write.ledger_key)?;
        ledger_after.liquidity_shares = apply_delta(
            ledger_after.liquidity_shares,
            write.ledger_delta.liquidity_shares,
            &write.ledger_key,
        )?;
        ledger_after.updated_at = Utc::now();

        let user_id = write.ledger_key.user_id;
        let account = inner
            .accounts
            .get(&user_id)
            .ok_or(EngineError::AccountNotFound(user_id))?;
        let cash_after = account.cash_balance + write.cash_delta;
        if cash_after < Decimal::ZERO {
            return Err(EngineError::Conflict {
                market_id: write.pool.key.market_id,
                outcome_id: write.pool.key.outcome_id,
                expected: write.expected_version,
                actual: current.version,
            });
        }

        // Point of no return: everything below succeeds together
        let next_version = write.expected_version + 1;
        inner.pools.insert(
            write.pool.key,
            VersionedPool {
                version: next_version,
                pool: write.pool.clone(),
            },
        );
        inner.ledgers.insert(write.ledger_key, ledger_after);
        if let Some(account) = inner.accounts.get_mut(&user_id) {
            account.cash_balance = cash_after;
        }
        if let Some(market) = inner.markets.get_mut(&write.pool.key.market_id) {
            market.volume += volume_delta;
        }
        if write.audit.kind == AuditKind::Trade {
            let point = PricePoint {
                timestamp: write.audit.timestamp,
                price: write.pool.price(Outcome::Yes),
            };
            inner
                .price_charts
                .entry(write.pool.key)
                .or_default()
                .push(point);
        }
        inner.audit_log.push(write.audit);

        debug!(
            pool = %write.pool.key,
            version = next_version,
            "settlement committed"
        );
        Ok(())
    }

    async fn commit_payout(&self, write: PayoutWrite) -> Result<bool> {
        let mut inner = self.inner.write().await;

        // Already-deleted entries make resolution replays a no-op
        if !inner.ledgers.contains_key(&write.ledger_key) {
            return Ok(false);
        }
        let user_id = write.ledger_key.user_id;
        if !inner.accounts.contains_key(&user_id) {
            return Err(EngineError::AccountNotFound(user_id));
        }

        inner.ledgers.remove(&write.ledger_key);
        if let Some(account) = inner.accounts.get_mut(&user_id) {
            account.cash_balance += write.cash_credit;
        }
        if let Some(audit) = write.audit {
            inner.audit_log.push(audit);
        }
        Ok(true)
    }

    async fn audit_records(&self, user_id: UserId) -> Result<Vec<AuditRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .audit_log
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }
}
