//! Durable account storage.
//!
//! The [`AccountStore`] trait is the boundary between the admission protocol
//! and persistence. It deliberately exposes only three operations: a point
//! lookup, an insert-if-absent seed, and the atomic conditional debit that
//! the whole system's correctness hangs on. Implementations don't decide
//! admission policy; they only guarantee the atomicity of `try_debit`.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod in_memory;
pub mod postgres;

#[cfg(test)]
pub(crate) mod testing;

pub use in_memory::InMemoryAccountStore;
pub use postgres::PostgresAccountStore;

/// One account per API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    /// Opaque unique identifier; immutable once created.
    pub api_key: String,
    /// Spendable balance. Never negative in steady state.
    pub credits: i64,
    /// Deactivated accounts are rejected regardless of balance.
    pub is_active: bool,
}

/// Errors from the account store.
///
/// A missing account is *not* an error (lookups return `Option`); the only
/// failure mode is the store being unreachable, and callers must fail closed
/// on it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Durable storage could not be reached (connection failure, pool
    /// acquire timeout, statement failure).
    #[error("account store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage backend for account records.
///
/// Schema creation is handled at startup (see [`crate::migrator`]); the trait
/// covers the per-request operations plus the idempotent bootstrap seed.
pub trait AccountStore: Send + Sync {
    /// Point lookup by API key.
    ///
    /// `Ok(None)` is a normal negative result, not an error.
    fn get(&self, api_key: &str) -> impl Future<Output = Result<Option<Account>>> + Send;

    /// Insert an account only if no record with that key exists.
    ///
    /// A no-op when the key is already present, including when another
    /// instance seeded it concurrently. Never overwrites an existing record.
    fn seed_account(
        &self,
        api_key: &str,
        credits: i64,
        is_active: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically decrement `credits` by `amount`, but only if the account
    /// is still active and holds at least `amount` at the moment of the
    /// write.
    ///
    /// Returns `Some(new_balance)` read back from the same indivisible
    /// operation, or `None` if the guard no longer held (e.g. a concurrent
    /// request spent the last credit first). Implementations must not split
    /// this into a read followed by a write.
    fn try_debit(
        &self,
        api_key: &str,
        amount: i64,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;
}
