//! In-memory account store.
//!
//! Accounts live in a shared map guarded by a single lock; the write lock
//! held across the check-and-decrement in `try_debit` plays the role of the
//! database row guard. Suitable for tests and single-process demos; state is
//! lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Account, AccountStore, Result};

/// In-memory implementation of [`AccountStore`].
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for InMemoryAccountStore {
    async fn get(&self, api_key: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().get(api_key).cloned())
    }

    async fn seed_account(&self, api_key: &str, credits: i64, is_active: bool) -> Result<()> {
        self.accounts
            .write()
            .entry(api_key.to_string())
            .or_insert_with(|| Account {
                api_key: api_key.to_string(),
                credits,
                is_active,
            });
        Ok(())
    }

    async fn try_debit(&self, api_key: &str, amount: i64) -> Result<Option<i64>> {
        let mut accounts = self.accounts.write();
        match accounts.get_mut(api_key) {
            Some(account) if account.is_active && account.credits >= amount => {
                account.credits -= amount;
                Ok(Some(account.credits))
            }
            _ => Ok(None),
        }
    }
}
