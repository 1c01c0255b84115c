//! PostgreSQL account store.
//!
//! The production backend. The debit is a single guarded `UPDATE ...
//! RETURNING` statement, so the row lock taken by the update is the only
//! serialization point in the system: concurrent requests for the same key
//! queue on the row, and whichever applies last sees the guard fail and gets
//! zero rows back instead of driving the balance negative.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::instrument;

use crate::config::PoolSettings;

use super::{Account, AccountStore, Result};

/// PostgreSQL-backed account store over a connection pool.
///
/// Each operation borrows a pooled connection scoped to its statement; the
/// pool's acquire timeout bounds every storage call, and acquire failures
/// surface as [`super::StoreError::Unavailable`].
#[derive(Clone)]
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool with the given settings.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .idle_timeout((settings.idle_timeout_secs > 0).then(|| Duration::from_secs(settings.idle_timeout_secs)))
            .max_lifetime((settings.max_lifetime_secs > 0).then(|| Duration::from_secs(settings.max_lifetime_secs)))
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl AccountStore for PostgresAccountStore {
    #[instrument(skip(self, api_key), err)]
    async fn get(&self, api_key: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT api_key, credits, is_active FROM accounts WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    #[instrument(skip(self, api_key), err)]
    async fn seed_account(&self, api_key: &str, credits: i64, is_active: bool) -> Result<()> {
        // Insert-if-absent: a concurrent seed from another instance wins the
        // insert and this one becomes a no-op rather than an error.
        sqlx::query(
            "INSERT INTO accounts (api_key, credits, is_active)
             VALUES ($1, $2, $3)
             ON CONFLICT (api_key) DO NOTHING",
        )
        .bind(api_key)
        .bind(credits)
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, api_key), err)]
    async fn try_debit(&self, api_key: &str, amount: i64) -> Result<Option<i64>> {
        // The guard re-checks balance and active state at write time; a
        // zero-row update means the precondition no longer held.
        let remaining = sqlx::query_scalar::<_, i64>(
            "UPDATE accounts
             SET credits = credits - $2
             WHERE api_key = $1 AND is_active AND credits >= $2
             RETURNING credits",
        )
        .bind(api_key)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn seed_is_idempotent(pool: PgPool) {
        let store = PostgresAccountStore::new(pool);

        store.seed_account("k1", 50, true).await.unwrap();
        // Second seed must not overwrite the existing record.
        store.seed_account("k1", 10, false).await.unwrap();

        let account = store.get("k1").await.unwrap().unwrap();
        assert_eq!(account.credits, 50);
        assert!(account.is_active);
    }

    #[sqlx::test]
    async fn debit_stops_at_zero(pool: PgPool) {
        let store = PostgresAccountStore::new(pool);
        store.seed_account("k1", 2, true).await.unwrap();

        assert_eq!(store.try_debit("k1", 1).await.unwrap(), Some(1));
        assert_eq!(store.try_debit("k1", 1).await.unwrap(), Some(0));
        assert_eq!(store.try_debit("k1", 1).await.unwrap(), None);

        let account = store.get("k1").await.unwrap().unwrap();
        assert_eq!(account.credits, 0);
    }

    #[sqlx::test]
    async fn debit_refuses_inactive_account(pool: PgPool) {
        let store = PostgresAccountStore::new(pool);
        store.seed_account("k2", 5, false).await.unwrap();

        assert_eq!(store.try_debit("k2", 1).await.unwrap(), None);
        assert_eq!(store.get("k2").await.unwrap().unwrap().credits, 5);
    }

    #[sqlx::test]
    async fn debit_unknown_key_is_none(pool: PgPool) {
        let store = PostgresAccountStore::new(pool);
        assert_eq!(store.try_debit("missing", 1).await.unwrap(), None);
    }

    #[sqlx::test]
    async fn concurrent_debits_spend_last_credit_once(pool: PgPool) {
        let store = PostgresAccountStore::new(pool);
        store.seed_account("k1", 1, true).await.unwrap();

        let (a, b) = tokio::join!(store.try_debit("k1", 1), store.try_debit("k1", 1));
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_some()).count(), 1);
        assert!(outcomes.contains(&Some(0)));
        assert_eq!(store.get("k1").await.unwrap().unwrap().credits, 0);
    }
}
