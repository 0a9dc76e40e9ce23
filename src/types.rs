//! Core domain types shared across the engine, settlement and resolution layers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable market identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketId(pub Uuid);

impl MarketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MarketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of one outcome pair within a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutcomeId(pub Uuid);

impl OutcomeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OutcomeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OutcomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of a binary proposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl Outcome {
    pub fn opposite(self) -> Outcome {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Yes => write!(f, "YES"),
            Outcome::No => write!(f, "NO"),
        }
    }
}

/// Trade direction against the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "BUY"),
            TradeDirection::Sell => write!(f, "SELL"),
        }
    }
}

/// Market lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "resolving")]
    Resolving,
    #[serde(rename = "closed")]
    Closed,
}

/// One tradeable proposition within a market, e.g. a candidate contesting a seat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeInfo {
    pub id: OutcomeId,
    /// Human-readable proposition, e.g. "Jane Doe wins the presidency"
    pub label: String,
}

/// Market metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub title: String,
    pub outcomes: Vec<OutcomeInfo>,
    pub expires_at: DateTime<Utc>,
    pub status: MarketStatus,
    /// Cumulative traded amount across all outcome pools
    pub volume: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Market {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn outcome_label(&self, outcome_id: OutcomeId) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|o| o.id == outcome_id)
            .map(|o| o.label.as_str())
    }
}

/// Join key of an outcome pool and its ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub market_id: MarketId,
    pub outcome_id: OutcomeId,
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.market_id, self.outcome_id)
    }
}

/// Reserves of one outcome pair's constant-product pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePool {
    pub key: PoolKey,
    pub yes_reserve: Decimal,
    pub no_reserve: Decimal,
    /// Fixed at creation as `yes_reserve * no_reserve`; changed only by liquidity events
    pub invariant_k: Decimal,
    pub liquidity_shares_outstanding: Decimal,
    /// Monotonically non-decreasing cumulative traded amount
    pub volume: Decimal,
}

impl OutcomePool {
    /// Fresh pool seeded with equal reserves on both sides
    pub fn seeded(key: PoolKey, seed_reserve: Decimal, seed_shares: Decimal) -> Self {
        Self {
            key,
            yes_reserve: seed_reserve,
            no_reserve: seed_reserve,
            invariant_k: seed_reserve * seed_reserve,
            liquidity_shares_outstanding: seed_shares,
            volume: Decimal::ZERO,
        }
    }

    pub fn reserve(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Yes => self.yes_reserve,
            Outcome::No => self.no_reserve,
        }
    }

    /// Marginal price of one side, in [0, 1]
    pub fn price(&self, side: Outcome) -> Decimal {
        let total = self.yes_reserve + self.no_reserve;
        if total.is_zero() {
            return Decimal::ZERO;
        }
        match side {
            Outcome::Yes => self.no_reserve / total,
            Outcome::No => self.yes_reserve / total,
        }
    }
}

/// Join key of a user's holdings in one outcome pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub pool: PoolKey,
    pub user_id: UserId,
}

/// Per-user token and liquidity-share holdings for one outcome pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: LedgerKey,
    pub yes_balance: Decimal,
    pub no_balance: Decimal,
    pub liquidity_shares: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Zero-balance entry, the state implied by a missing record
    pub fn empty(key: LedgerKey) -> Self {
        Self {
            key,
            yes_balance: Decimal::ZERO,
            no_balance: Decimal::ZERO,
            liquidity_shares: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    pub fn balance(&self, side: Outcome) -> Decimal {
        match side {
            Outcome::Yes => self.yes_balance,
            Outcome::No => self.no_balance,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.yes_balance.is_zero() && self.no_balance.is_zero() && self.liquidity_shares.is_zero()
    }
}

/// User cash account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub cash_balance: Decimal,
    pub cumulative_deposited: Decimal,
    pub cumulative_withdrawn: Decimal,
}

impl UserAccount {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            cash_balance: Decimal::ZERO,
            cumulative_deposited: Decimal::ZERO,
            cumulative_withdrawn: Decimal::ZERO,
        }
    }
}

/// Settlement type recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    #[serde(rename = "TRADE")]
    Trade,
    #[serde(rename = "MINT")]
    Mint,
    #[serde(rename = "REDEEM")]
    Redeem,
    #[serde(rename = "ADD_LIQUIDITY")]
    AddLiquidity,
    #[serde(rename = "REMOVE_LIQUIDITY")]
    RemoveLiquidity,
    #[serde(rename = "RESOLUTION")]
    Resolution,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditKind::Trade => "TRADE",
            AuditKind::Mint => "MINT",
            AuditKind::Redeem => "REDEEM",
            AuditKind::AddLiquidity => "ADD_LIQUIDITY",
            AuditKind::RemoveLiquidity => "REMOVE_LIQUIDITY",
            AuditKind::Resolution => "RESOLUTION",
        };
        write!(f, "{}", s)
    }
}

/// One sample of a pool's post-trade price series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    /// Post-trade price of the YES side
    pub price: Decimal,
}

/// Immutable, append-only record of one settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub market_id: MarketId,
    pub outcome_id: OutcomeId,
    pub user_id: UserId,
    pub kind: AuditKind,
    pub direction: Option<TradeDirection>,
    pub side: Option<Outcome>,
    /// Token quantity moved by the settlement
    pub quantity: Decimal,
    /// Cash quantity moved by the settlement
    pub quantity_usd: Decimal,
    /// Post-trade price of the traded side, for TRADE records
    pub price: Option<Decimal>,
    /// Human-readable description of a settled proposition, for RESOLUTION records
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}
