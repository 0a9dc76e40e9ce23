//! Market lifecycle: creation with seeded pools, lookup

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::MarketConfig;
use crate::error::{EngineError, Result};
use crate::storage::ExchangeStore;
use crate::types::{
    Market, MarketId, MarketStatus, OutcomeId, OutcomeInfo, OutcomePool, PoolKey, PricePoint,
};

/// Market creation and lookup over the shared store
pub struct MarketService {
    store: Arc<dyn ExchangeStore>,
    config: MarketConfig,
}

impl MarketService {
    pub fn new(store: Arc<dyn ExchangeStore>, config: MarketConfig) -> Self {
        Self { store, config }
    }

    /// Create a market with one seeded constant-product pool per proposition
    pub async fn create_market(
        &self,
        title: &str,
        outcome_labels: Vec<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<Market> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("title", "must not be empty"));
        }
        if outcome_labels.is_empty() {
            return Err(EngineError::validation(
                "outcomes",
                "a market needs at least one proposition",
            ));
        }
        if outcome_labels.iter().any(|label| label.trim().is_empty()) {
            return Err(EngineError::validation(
                "outcomes",
                "proposition labels must not be empty",
            ));
        }
        if expires_at <= Utc::now() {
            return Err(EngineError::validation(
                "expires_at",
                "must be in the future",
            ));
        }

        let market_id = MarketId::new();
        let outcomes: Vec<OutcomeInfo> = outcome_labels
            .into_iter()
            .map(|label| OutcomeInfo {
                id: OutcomeId::new(),
                label,
            })
            .collect();
        let pools: Vec<OutcomePool> = outcomes
            .iter()
            .map(|outcome| {
                OutcomePool::seeded(
                    PoolKey {
                        market_id,
                        outcome_id: outcome.id,
                    },
                    self.config.seed_reserve,
                    self.config.seed_liquidity_shares,
                )
            })
            .collect();

        let market = Market {
            id: market_id,
            title: title.to_string(),
            outcomes,
            expires_at,
            status: MarketStatus::Open,
            volume: rust_decimal::Decimal::ZERO,
            created_at: Utc::now(),
        };
        self.store.insert_market(market.clone(), pools).await?;

        info!(
            market_id = %market_id,
            outcomes = market.outcomes.len(),
            expires_at = %expires_at,
            "market created"
        );
        Ok(market)
    }

    pub async fn market(&self, market_id: MarketId) -> Result<Market> {
        self.store.market(market_id).await
    }

    pub async fn open_markets(&self) -> Result<Vec<Market>> {
        self.store.open_markets().await
    }

    /// Current pool snapshot for one proposition
    pub async fn pool(&self, market_id: MarketId, outcome_id: OutcomeId) -> Result<OutcomePool> {
        let versioned = self
            .store
            .pool(&PoolKey {
                market_id,
                outcome_id,
            })
            .await?;
        Ok(versioned.pool)
    }

    /// Post-trade price series for one proposition, oldest first
    pub async fn price_chart(
        &self,
        market_id: MarketId,
        outcome_id: OutcomeId,
    ) -> Result<Vec<PricePoint>> {
        self.store
            .price_chart(&PoolKey {
                market_id,
                outcome_id,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::Outcome;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn service() -> MarketService {
        MarketService::new(Arc::new(InMemoryStore::new()), MarketConfig::default())
    }

    #[tokio::test]
    async fn test_create_market_seeds_pools() {
        let service = service();
        let market = service
            .create_market(
                "Presidential election",
                vec![
                    "Jane Doe wins the presidency".to_string(),
                    "John Smith wins the presidency".to_string(),
                ],
                Utc::now() + Duration::days(90),
            )
            .await
            .unwrap();

        assert_eq!(market.status, MarketStatus::Open);
        assert_eq!(market.outcomes.len(), 2);
        for outcome in &market.outcomes {
            let pool = service.pool(market.id, outcome.id).await.unwrap();
            assert_eq!(pool.yes_reserve, dec!(2000));
            assert_eq!(pool.no_reserve, dec!(2000));
            assert_eq!(pool.invariant_k, dec!(4000000));
            assert_eq!(pool.liquidity_shares_outstanding, dec!(100));
            assert_eq!(pool.price(Outcome::Yes), dec!(0.5));
        }
    }

    #[tokio::test]
    async fn test_create_market_rejects_past_expiry() {
        let service = service();
        let err = service
            .create_market(
                "Stale market",
                vec!["Anything".to_string()],
                Utc::now() - Duration::minutes(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_market_rejects_empty_propositions() {
        let service = service();
        let err = service
            .create_market("No props", vec![], Utc::now() + Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        let err = service
            .create_market(
                "Blank prop",
                vec!["  ".to_string()],
                Utc::now() + Duration::days(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_open_markets_excludes_closed() {
        let service = service();
        let market = service
            .create_market(
                "Senate race",
                vec!["Incumbent holds the seat".to_string()],
                Utc::now() + Duration::days(30),
            )
            .await
            .unwrap();
        assert_eq!(service.open_markets().await.unwrap().len(), 1);

        service
            .store
            .set_market_status(market.id, MarketStatus::Closed)
            .await
            .unwrap();
        assert!(service.open_markets().await.unwrap().is_empty());
    }
}
