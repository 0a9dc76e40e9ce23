//! Terminal market resolution
//!
//! Liquidates every holder of a market to cash once the results of its
//! propositions are declared. No long-lived lock spans the holder walk:
//! each payout commits independently, and replaying an already-deleted
//! ledger entry is a no-op, so an interrupted resolution can simply be
//! run again.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SettlementConfig;
use crate::error::{EngineError, Result};
use crate::storage::{with_timeout, ExchangeStore, PayoutWrite};
use crate::types::{
    AuditKind, AuditRecord, LedgerKey, MarketId, MarketStatus, Outcome, OutcomeId, PoolKey,
};

/// Summary of one resolution run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionReport {
    pub market_id: MarketId,
    /// The market was already closed; nothing was changed
    pub already_resolved: bool,
    pub holders_paid: u64,
    pub holders_skipped: u64,
    pub total_payout: Decimal,
}

impl ResolutionReport {
    fn already_resolved(market_id: MarketId) -> Self {
        Self {
            market_id,
            already_resolved: true,
            holders_paid: 0,
            holders_skipped: 0,
            total_payout: Decimal::ZERO,
        }
    }
}

/// One-time liquidation of a market's outstanding balances
pub struct ResolutionService {
    store: Arc<dyn ExchangeStore>,
    config: SettlementConfig,
}

impl ResolutionService {
    pub fn new(store: Arc<dyn ExchangeStore>, config: SettlementConfig) -> Self {
        Self { store, config }
    }

    /// Resolve a market given the declared result of every proposition.
    ///
    /// A holder's payout is the winning-side token balance plus the
    /// pro-rata share of the winning-side reserve. Ledger entries are
    /// deleted as they are paid; re-running after a partial failure picks
    /// up exactly the holders that remain.
    pub async fn resolve(
        &self,
        market_id: MarketId,
        results: &HashMap<OutcomeId, Outcome>,
    ) -> Result<ResolutionReport> {
        let limit = self.config.storage_timeout;
        let market = with_timeout(limit, self.store.market(market_id)).await?;

        if market.status == MarketStatus::Closed {
            info!(market_id = %market_id, "market already resolved");
            return Ok(ResolutionReport::already_resolved(market_id));
        }
        for outcome in &market.outcomes {
            if !results.contains_key(&outcome.id) {
                return Err(EngineError::validation(
                    "results",
                    format!("missing declared result for proposition '{}'", outcome.label),
                ));
            }
        }

        with_timeout(
            limit,
            self.store.set_market_status(market_id, MarketStatus::Resolving),
        )
        .await?;
        info!(market_id = %market_id, title = %market.title, "resolution started");

        let mut report = ResolutionReport {
            market_id,
            already_resolved: false,
            holders_paid: 0,
            holders_skipped: 0,
            total_payout: Decimal::ZERO,
        };

        for outcome in &market.outcomes {
            let result = results[&outcome.id];
            let key = PoolKey {
                market_id,
                outcome_id: outcome.id,
            };
            let pool = with_timeout(limit, self.store.pool(&key)).await?.pool;
            let holders = with_timeout(limit, self.store.pool_holders(&key)).await?;

            for entry in holders {
                if entry.is_zero() {
                    // Degenerate holder: drop the entry, no payout record
                    with_timeout(
                        limit,
                        self.store.commit_payout(PayoutWrite {
                            ledger_key: entry.key,
                            cash_credit: Decimal::ZERO,
                            audit: None,
                        }),
                    )
                    .await?;
                    report.holders_skipped += 1;
                    continue;
                }

                let share_of_pool = if pool.liquidity_shares_outstanding > Decimal::ZERO {
                    entry.liquidity_shares / pool.liquidity_shares_outstanding
                } else {
                    Decimal::ZERO
                };
                let payout = entry.balance(result) + share_of_pool * pool.reserve(result);

                let applied = with_timeout(
                    limit,
                    self.store.commit_payout(PayoutWrite {
                        ledger_key: entry.key,
                        cash_credit: payout,
                        audit: Some(resolution_audit(
                            &entry.key,
                            result,
                            payout,
                            &outcome.label,
                        )),
                    }),
                )
                .await?;

                if applied {
                    report.holders_paid += 1;
                    report.total_payout += payout;
                } else {
                    // Entry vanished since the holder list was read; an
                    // earlier interrupted run already paid it
                    warn!(
                        pool = %key,
                        user_id = %entry.key.user_id,
                        "holder already settled, skipping"
                    );
                    report.holders_skipped += 1;
                }
            }
        }

        with_timeout(
            limit,
            self.store.set_market_status(market_id, MarketStatus::Closed),
        )
        .await?;
        info!(
            market_id = %market_id,
            holders_paid = report.holders_paid,
            total_payout = %report.total_payout,
            "resolution complete"
        );
        Ok(report)
    }
}

fn resolution_audit(
    key: &LedgerKey,
    result: Outcome,
    payout: Decimal,
    label: &str,
) -> AuditRecord {
    AuditRecord {
        id: Uuid::new_v4(),
        market_id: key.pool.market_id,
        outcome_id: key.pool.outcome_id,
        user_id: key.user_id,
        kind: AuditKind::Resolution,
        direction: None,
        side: Some(result),
        quantity: Decimal::ZERO,
        quantity_usd: payout,
        price: None,
        description: Some(format!("\"{}\" resolved {}", label, result)),
        timestamp: Utc::now(),
    }
}
