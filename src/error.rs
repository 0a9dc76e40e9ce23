//! Structured error handling for the settlement engine

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::types::{MarketId, Outcome, OutcomeId, UserId};

/// Application error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Rejected before the engine runs; never retried
    #[error("validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient {side} tokens: required {required}, available {available}")]
    InsufficientTokens {
        side: Outcome,
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient liquidity shares: required {required}, available {available}")]
    InsufficientShares {
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient pool liquidity for payout of {payout}")]
    InsufficientLiquidity { payout: Decimal },

    #[error("market {0} not found")]
    MarketNotFound(MarketId),

    #[error("pool {market_id}/{outcome_id} not found")]
    PoolNotFound {
        market_id: MarketId,
        outcome_id: OutcomeId,
    },

    #[error("account {0} not found")]
    AccountNotFound(UserId),

    #[error("market {0} is closed")]
    MarketClosed(MarketId),

    #[error("market {market_id} expired at {expired_at}")]
    MarketExpired {
        market_id: MarketId,
        expired_at: chrono::DateTime<chrono::Utc>,
    },

    /// Concurrent mutation of the same pool; retried with fresh state
    #[error("conflicting update on pool {market_id}/{outcome_id}: expected version {expected}, found {actual}")]
    Conflict {
        market_id: MarketId,
        outcome_id: OutcomeId,
        expected: u64,
        actual: u64,
    },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage operation timed out after {0:?}")]
    StorageTimeout(Duration),
}

impl EngineError {
    /// Whether the caller may retry the operation with freshly read state
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Conflict { .. } | EngineError::StorageTimeout(_)
        )
    }

    /// Shorthand for a validation rejection
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// Convenient type alias
pub type Result<T> = std::result::Result<T, EngineError>;
