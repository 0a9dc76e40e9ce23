//! Atomic application of engine-computed transitions
//!
//! Settlements against the same outcome pool are serialized behind a
//! per-pool async mutex; disjoint pools never contend. Under the lock the
//! service reads versioned state, validates preconditions, runs the pure
//! engine, and commits the whole transition through the store as one unit.
//! Every storage call is bounded by the configured timeout, and retryable
//! failures (stale pool version, timed-out call) are retried with freshly
//! read state up to a bounded count. The commit is the sole point of no
//! return: an attempt abandoned before the commit leaves no trace.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::amm_engine::{self, PoolAction};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::storage::{with_timeout, ExchangeStore, SettlementWrite};
use crate::types::{
    AuditRecord, LedgerEntry, LedgerKey, MarketId, OutcomeId, OutcomePool, PoolKey, UserId,
};
use crate::validation;

/// Outcome of one applied settlement
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub audit: AuditRecord,
    pub pool_after: OutcomePool,
    /// Signed change applied to the user's cash balance
    pub cash_delta: Decimal,
}

/// Applies validated engine transitions to persisted state
pub struct SettlementService {
    store: Arc<dyn ExchangeStore>,
    config: EngineConfig,
    locks: DashMap<PoolKey, Arc<Mutex<()>>>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn ExchangeStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            locks: DashMap::new(),
        }
    }

    /// Settle one user action against one outcome pool
    pub async fn settle(
        &self,
        market_id: MarketId,
        outcome_id: OutcomeId,
        user_id: UserId,
        action: PoolAction,
    ) -> Result<SettlementReceipt> {
        validation::check_amount(&action)?;

        let key = PoolKey {
            market_id,
            outcome_id,
        };
        let lock = self.pool_lock(key);
        let _guard = lock.lock().await;

        let mut attempt = 0u32;
        loop {
            match self.try_settle(key, user_id, action).await {
                Err(err)
                    if err.is_retryable()
                        && attempt < self.config.settlement.max_conflict_retries =>
                {
                    attempt += 1;
                    warn!(
                        pool = %key,
                        user_id = %user_id,
                        attempt,
                        error = %err,
                        "settlement retrying with fresh state"
                    );
                }
                other => return other,
            }
        }
    }

    /// One read-validate-compute-commit cycle under the pool lock
    async fn try_settle(
        &self,
        key: PoolKey,
        user_id: UserId,
        action: PoolAction,
    ) -> Result<SettlementReceipt> {
        let limit = self.config.settlement.storage_timeout;

        let market = with_timeout(limit, self.store.market(key.market_id)).await?;
        validation::check_market_open(
            &market,
            &action,
            Utc::now(),
            self.config.market.enforce_expiry,
        )?;

        let versioned = with_timeout(limit, self.store.pool(&key)).await?;
        let ledger_key = LedgerKey { pool: key, user_id };
        let ledger = with_timeout(limit, self.store.ledger_entry(&ledger_key))
            .await?
            .unwrap_or_else(|| LedgerEntry::empty(ledger_key));
        let account = with_timeout(limit, self.store.account(user_id)).await?;

        validation::check_ownership(&action, &versioned.pool, &ledger, &account)?;

        let transition = amm_engine::compute(&versioned.pool, action)?;
        debug!(
            pool = %key,
            kind = %transition.audit.kind,
            quantity = %transition.audit.quantity,
            quantity_usd = %transition.audit.quantity_usd,
            "transition computed"
        );

        let audit = AuditRecord {
            id: Uuid::new_v4(),
            market_id: key.market_id,
            outcome_id: key.outcome_id,
            user_id,
            kind: transition.audit.kind,
            direction: transition.audit.direction,
            side: transition.audit.side,
            quantity: transition.audit.quantity,
            quantity_usd: transition.audit.quantity_usd,
            price: transition.audit.price,
            description: transition
                .audit
                .details
                .as_ref()
                .map(|details| details.to_string()),
            timestamp: Utc::now(),
        };

        with_timeout(
            limit,
            self.store.commit_settlement(SettlementWrite {
                expected_version: versioned.version,
                pool: transition.pool_after.clone(),
                ledger_key,
                ledger_delta: transition.ledger_delta,
                cash_delta: transition.cash_delta,
                audit: audit.clone(),
            }),
        )
        .await?;

        info!(
            pool = %key,
            user_id = %user_id,
            kind = %audit.kind,
            quantity = %audit.quantity,
            quantity_usd = %audit.quantity_usd,
            "settlement applied"
        );
        Ok(SettlementReceipt {
            audit,
            pool_after: transition.pool_after,
            cash_delta: transition.cash_delta,
        })
    }

    fn pool_lock(&self, key: PoolKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
