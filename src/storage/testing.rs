//! Test-only store doubles.

use super::{Account, AccountStore, Result, StoreError};

/// A store whose every operation fails as unavailable. Used to verify that
/// callers fail closed when durable storage cannot be reached.
#[derive(Clone, Default)]
pub(crate) struct FailingAccountStore;

fn unavailable<T>() -> Result<T> {
    Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
}

impl AccountStore for FailingAccountStore {
    async fn get(&self, _api_key: &str) -> Result<Option<Account>> {
        unavailable()
    }

    async fn seed_account(&self, _api_key: &str, _credits: i64, _is_active: bool) -> Result<()> {
        unavailable()
    }

    async fn try_debit(&self, _api_key: &str, _amount: i64) -> Result<Option<i64>> {
        unavailable()
    }
}
