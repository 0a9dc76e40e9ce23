//! Settlement core of a binary-outcome prediction-market exchange
//!
//! Users trade YES/NO tokens priced by a constant-product automated market
//! maker, mint and redeem complete token sets against cash, and supply or
//! withdraw liquidity. The crate is organized around a pure AMM engine
//! computing state transitions, a settlement layer applying them atomically
//! against pool/ledger/cash records with per-pool serialization, and a
//! terminal resolution pass liquidating all holders of a market once its
//! propositions are decided.

pub mod account_service;
pub mod amm_engine;
pub mod config;
pub mod error;
pub mod market_service;
pub mod resolution_service;
pub mod settlement_service;
pub mod storage;
pub mod types;
pub mod validation;

pub use account_service::AccountService;
pub use amm_engine::{PoolAction, Transition};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use market_service::MarketService;
pub use resolution_service::{ResolutionReport, ResolutionService};
pub use settlement_service::{SettlementReceipt, SettlementService};
pub use storage::{ExchangeStore, InMemoryStore};
pub use types::{
    AuditKind, AuditRecord, LedgerEntry, Market, MarketId, MarketStatus, Outcome, OutcomeId,
    OutcomePool, PricePoint, UserAccount, UserId,
};
