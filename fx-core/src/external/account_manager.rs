//! Account Manager client contract (spec §6). The Account Manager is an
//! external collaborator out of scope for this core (spec §1); this module
//! defines the trait the Order Manager calls through, plus an in-memory
//! mock used by tests and the demo binary.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AccountManagerError {
    #[error("insufficient funds: requested {requested} available {available}")]
    InsufficientFunds { requested: String, available: String },
    #[error("account {0} is inactive")]
    AccountInactive(String),
    #[error("unknown account error: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy)]
pub struct AccountOpResult {
    pub success: bool,
    pub available_balance: Decimal,
}

/// `Reserve`/`Release`/`Debit`/`Credit`/`GetUserAccount`/`GetBalance` (spec §6).
#[async_trait]
pub trait AccountManager: Send + Sync {
    async fn reserve(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<AccountOpResult, AccountManagerError>;

    async fn release(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<AccountOpResult, AccountManagerError>;

    async fn debit(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        meta: &str,
    ) -> Result<AccountOpResult, AccountManagerError>;

    async fn credit(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        meta: &str,
    ) -> Result<AccountOpResult, AccountManagerError>;

    async fn get_user_account(&self, user_id: &str, currency: &str) -> Option<String>;

    async fn get_balance(&self, account_id: &str, currency: &str) -> Decimal;
}

/// In-memory mock: one balance and one reserved amount per (account,
/// currency). Sufficient to exercise the Order Manager's reserve/release
/// flow without a real ledger.
pub struct InMemoryAccountManager {
    balances: DashMap<(String, String), Decimal>,
    reserved: DashMap<(String, String), Decimal>,
}

impl InMemoryAccountManager {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            reserved: DashMap::new(),
        }
    }

    pub fn fund(&self, account_id: &str, currency: &str, amount: Decimal) {
        *self
            .balances
            .entry((account_id.to_string(), currency.to_string()))
            .or_insert(Decimal::ZERO) += amount;
    }

    fn available(&self, account_id: &str, currency: &str) -> Decimal {
        let balance = self
            .balances
            .get(&(account_id.to_string(), currency.to_string()))
            .map(|b| *b)
            .unwrap_or(Decimal::ZERO);
        let reserved = self
            .reserved
            .get(&(account_id.to_string(), currency.to_string()))
            .map(|r| *r)
            .unwrap_or(Decimal::ZERO);
        balance - reserved
    }
}

impl Default for InMemoryAccountManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn shared_mock() -> Arc<InMemoryAccountManager> {
    Arc::new(InMemoryAccountManager::new())
}

#[async_trait]
impl AccountManager for InMemoryAccountManager {
    async fn reserve(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        _reference: &str,
    ) -> Result<AccountOpResult, AccountManagerError> {
        let key = (account_id.to_string(), currency.to_string());
        let available = self.available(account_id, currency);
        if amount > available {
            return Err(AccountManagerError::InsufficientFunds {
                requested: amount.to_string(),
                available: available.to_string(),
            });
        }
        *self.reserved.entry(key).or_insert(Decimal::ZERO) += amount;
        Ok(AccountOpResult {
            success: true,
            available_balance: self.available(account_id, currency),
        })
    }

    async fn release(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        _reference: &str,
    ) -> Result<AccountOpResult, AccountManagerError> {
        let key = (account_id.to_string(), currency.to_string());
        if let Some(mut r) = self.reserved.get_mut(&key) {
            *r = (*r - amount).max(Decimal::ZERO);
        }
        Ok(AccountOpResult {
            success: true,
            available_balance: self.available(account_id, currency),
        })
    }

    async fn debit(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        _meta: &str,
    ) -> Result<AccountOpResult, AccountManagerError> {
        let key = (account_id.to_string(), currency.to_string());
        *self.balances.entry(key).or_insert(Decimal::ZERO) -= amount;
        Ok(AccountOpResult {
            success: true,
            available_balance: self.available(account_id, currency),
        })
    }

    async fn credit(
        &self,
        account_id: &str,
        currency: &str,
        amount: Decimal,
        _meta: &str,
    ) -> Result<AccountOpResult, AccountManagerError> {
        let key = (account_id.to_string(), currency.to_string());
        *self.balances.entry(key).or_insert(Decimal::ZERO) += amount;
        Ok(AccountOpResult {
            success: true,
            available_balance: self.available(account_id, currency),
        })
    }

    async fn get_user_account(&self, user_id: &str, _currency: &str) -> Option<String> {
        Some(user_id.to_string())
    }

    async fn get_balance(&self, account_id: &str, currency: &str) -> Decimal {
        self.available(account_id, currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn reserve_then_release_restores_exact_amount() {
        let mgr = InMemoryAccountManager::new();
        mgr.fund("u1", "USD", dec!(11_050));
        mgr.reserve("u1", "USD", dec!(11_000), "ref").await.unwrap();
        assert_eq!(mgr.get_balance("u1", "USD").await, dec!(50));
        mgr.release("u1", "USD", dec!(11_000), "ref").await.unwrap();
        assert_eq!(mgr.get_balance("u1", "USD").await, dec!(11_050));
    }

    #[tokio::test]
    async fn reserve_beyond_balance_is_rejected() {
        let mgr = InMemoryAccountManager::new();
        mgr.fund("u1", "USD", dec!(10_000));
        let err = mgr.reserve("u1", "USD", dec!(11_000), "ref").await;
        assert!(matches!(err, Err(AccountManagerError::InsufficientFunds { .. })));
    }
}
