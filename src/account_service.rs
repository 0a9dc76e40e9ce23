//! Cash deposits and withdrawals

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::storage::ExchangeStore;
use crate::types::{UserAccount, UserId};

/// Account cash management over the shared store
pub struct AccountService {
    store: Arc<dyn ExchangeStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn ExchangeStore>) -> Self {
        Self { store }
    }

    pub async fn account(&self, user_id: UserId) -> Result<UserAccount> {
        self.store.account(user_id).await
    }

    /// Credit cash; the account is created lazily on first deposit
    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<UserAccount> {
        check_positive(amount)?;
        let account = self.store.deposit(user_id, amount).await?;
        info!(user_id = %user_id, amount = %amount, balance = %account.cash_balance, "deposit");
        Ok(account)
    }

    /// Debit cash, bounded by the current balance
    pub async fn withdraw(&self, user_id: UserId, amount: Decimal) -> Result<UserAccount> {
        check_positive(amount)?;
        let account = self.store.withdraw(user_id, amount).await?;
        info!(user_id = %user_id, amount = %amount, balance = %account.cash_balance, "withdrawal");
        Ok(account)
    }
}

fn check_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::validation(
            "amount",
            format!("must be positive, got {}", amount),
        ));
    }
    Ok(())
}
