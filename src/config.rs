//! Engine configuration with environment overrides

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Market seeding configuration
    pub market: MarketConfig,

    /// Settlement configuration
    pub settlement: SettlementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Reserves seeded on each side of a new outcome pool
    pub seed_reserve: Decimal,
    /// Liquidity shares outstanding at pool creation (house-owned)
    pub seed_liquidity_shares: Decimal,
    /// Reject position-opening actions once a market's expiry has passed
    pub enforce_expiry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Upper bound on any single storage operation
    pub storage_timeout: Duration,
    /// Retries of a settlement after a conflicting concurrent update
    pub max_conflict_retries: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            seed_reserve: dec!(2000),
            seed_liquidity_shares: dec!(100),
            enforce_expiry: true,
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
            max_conflict_retries: 3,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        EngineConfig {
            market: MarketConfig {
                seed_reserve: env::var("MARKET_SEED_RESERVE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.market.seed_reserve),
                seed_liquidity_shares: env::var("MARKET_SEED_LIQUIDITY_SHARES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.market.seed_liquidity_shares),
                enforce_expiry: env::var("MARKET_ENFORCE_EXPIRY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.market.enforce_expiry),
            },
            settlement: SettlementConfig {
                storage_timeout: env::var("SETTLEMENT_STORAGE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.settlement.storage_timeout),
                max_conflict_retries: env::var("SETTLEMENT_MAX_CONFLICT_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.settlement.max_conflict_retries),
            },
        }
    }
}
