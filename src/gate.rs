//! The ledger gate: authenticate, validate, and debit in one protocol.
//!
//! [`LedgerGate::authorize_and_debit`] is the only path by which a request
//! may reach the downstream processor. It performs no in-process locking;
//! all cross-request mutual exclusion for a given account is delegated to
//! the store's atomic conditional decrement, which re-checks the balance at
//! write time. Two concurrent requests against an account holding one credit
//! therefore resolve to exactly one admission and one quota rejection, never
//! two of either.

use thiserror::Error;

use crate::storage::{AccountStore, StoreError};

/// Credits consumed per admitted request.
const DEBIT_AMOUNT: i64 = 1;

/// Why a request was not admitted.
///
/// Everything except `StoreUnavailable` is an expected, user-facing outcome
/// and is never logged as a system error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No API key was presented.
    #[error("x-api-key header is missing")]
    MissingKey,
    /// The key doesn't map to any account.
    #[error("invalid API key")]
    UnknownKey,
    /// The account has been deactivated, regardless of balance.
    #[error("account is inactive")]
    Inactive,
    /// The account holds no spendable credit.
    #[error("insufficient credits, please top up")]
    InsufficientCredit,
    /// Durable storage could not be reached; the request is refused rather
    /// than admitted on uncertainty.
    #[error("account store unavailable, try again later")]
    StoreUnavailable,
}

/// Terminal outcome of one `authorize_and_debit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed; the balance already reflects the debit.
    Admitted { remaining_credits: i64 },
    /// The request must not proceed; no storage mutation occurred.
    Rejected(Rejection),
}

/// The admission + debit protocol over an [`AccountStore`].
#[derive(Clone)]
pub struct LedgerGate<S> {
    store: S,
}

impl<S: AccountStore> LedgerGate<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Authenticate the key, validate the account, and atomically spend one
    /// credit.
    ///
    /// Check order is part of the contract: a deactivated account with a
    /// positive balance is reported as `Inactive`, not `InsufficientCredit`.
    /// The balance read in step 4 is advisory only; the debit re-checks it
    /// inside the store's guarded write, and a request that loses that race
    /// is rejected rather than silently retried.
    #[tracing::instrument(skip_all)]
    pub async fn authorize_and_debit(&self, api_key: Option<&str>) -> Decision {
        let api_key = match api_key {
            Some(key) if !key.is_empty() => key,
            _ => return Decision::Rejected(Rejection::MissingKey),
        };

        let account = match self.store.get(api_key).await {
            Ok(Some(account)) => account,
            Ok(None) => return Decision::Rejected(Rejection::UnknownKey),
            Err(err) => return Decision::Rejected(store_failure(err)),
        };

        if !account.is_active {
            return Decision::Rejected(Rejection::Inactive);
        }

        if account.credits <= 0 {
            return Decision::Rejected(Rejection::InsufficientCredit);
        }

        match self.store.try_debit(api_key, DEBIT_AMOUNT).await {
            Ok(Some(remaining_credits)) => Decision::Admitted { remaining_credits },
            // A concurrent request exhausted the balance (or deactivated the
            // account) between the read above and the write.
            Ok(None) => Decision::Rejected(Rejection::InsufficientCredit),
            Err(err) => Decision::Rejected(store_failure(err)),
        }
    }
}

fn store_failure(err: StoreError) -> Rejection {
    tracing::error!(error = %err, "account store failure, refusing admission");
    Rejection::StoreUnavailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::FailingAccountStore;
    use crate::storage::InMemoryAccountStore;
    use std::sync::Arc;

    async fn gate_with(key: &str, credits: i64, is_active: bool) -> LedgerGate<InMemoryAccountStore> {
        let store = InMemoryAccountStore::new();
        store.seed_account(key, credits, is_active).await.unwrap();
        LedgerGate::new(store)
    }

    #[tokio::test]
    async fn missing_key_never_contacts_the_store() {
        // If the gate touched the store at all, this would come back as
        // StoreUnavailable instead of MissingKey.
        let gate = LedgerGate::new(FailingAccountStore);

        assert_eq!(
            gate.authorize_and_debit(None).await,
            Decision::Rejected(Rejection::MissingKey)
        );
        assert_eq!(
            gate.authorize_and_debit(Some("")).await,
            Decision::Rejected(Rejection::MissingKey)
        );
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let gate = gate_with("k1", 5, true).await;

        assert_eq!(
            gate.authorize_and_debit(Some("x")).await,
            Decision::Rejected(Rejection::UnknownKey)
        );
    }

    #[tokio::test]
    async fn inactive_account_is_rejected_before_balance() {
        let gate = gate_with("k2", 5, false).await;

        assert_eq!(
            gate.authorize_and_debit(Some("k2")).await,
            Decision::Rejected(Rejection::Inactive)
        );

        // No mutation on rejection.
        let account = gate.store().get("k2").await.unwrap().unwrap();
        assert_eq!(account.credits, 5);
    }

    #[tokio::test]
    async fn inactive_account_with_zero_credits_is_still_inactive() {
        let gate = gate_with("k2", 0, false).await;

        assert_eq!(
            gate.authorize_and_debit(Some("k2")).await,
            Decision::Rejected(Rejection::Inactive)
        );
    }

    #[tokio::test]
    async fn exhausted_account_is_rejected_without_a_write() {
        let gate = gate_with("k1", 0, true).await;

        assert_eq!(
            gate.authorize_and_debit(Some("k1")).await,
            Decision::Rejected(Rejection::InsufficientCredit)
        );
        assert_eq!(gate.store().get("k1").await.unwrap().unwrap().credits, 0);
    }

    #[tokio::test]
    async fn admission_debits_exactly_one_credit() {
        let gate = gate_with("k1", 50, true).await;

        assert_eq!(
            gate.authorize_and_debit(Some("k1")).await,
            Decision::Admitted { remaining_credits: 49 }
        );
        assert_eq!(gate.store().get("k1").await.unwrap().unwrap().credits, 49);
    }

    #[tokio::test]
    async fn store_outage_fails_closed() {
        let gate = LedgerGate::new(FailingAccountStore);

        assert_eq!(
            gate.authorize_and_debit(Some("k1")).await,
            Decision::Rejected(Rejection::StoreUnavailable)
        );
    }

    #[tokio::test]
    async fn two_concurrent_calls_for_one_credit_admit_exactly_once() {
        let gate = Arc::new(gate_with("k1", 1, true).await);

        let (a, b) = tokio::join!(
            gate.authorize_and_debit(Some("k1")),
            gate.authorize_and_debit(Some("k1"))
        );

        let outcomes = [a, b];
        assert_eq!(
            outcomes
                .iter()
                .filter(|d| matches!(d, Decision::Admitted { remaining_credits: 0 }))
                .count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|d| **d == Decision::Rejected(Rejection::InsufficientCredit))
                .count(),
            1
        );
        assert_eq!(gate.store().get("k1").await.unwrap().unwrap().credits, 0);
    }

    #[tokio::test]
    async fn no_over_spend_under_heavy_concurrency() {
        const BALANCE: i64 = 5;
        const CALLERS: usize = 32;

        let gate = Arc::new(gate_with("k1", BALANCE, true).await);

        let mut handles = Vec::with_capacity(CALLERS);
        for _ in 0..CALLERS {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.authorize_and_debit(Some("k1")).await
            }));
        }

        let mut admitted = 0usize;
        let mut exhausted = 0usize;
        for handle in handles {
            match handle.await.unwrap() {
                Decision::Admitted { remaining_credits } => {
                    admitted += 1;
                    assert!((0..BALANCE).contains(&remaining_credits));
                }
                Decision::Rejected(Rejection::InsufficientCredit) => exhausted += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        assert_eq!(admitted, BALANCE as usize);
        assert_eq!(exhausted, CALLERS - BALANCE as usize);
        assert_eq!(gate.store().get("k1").await.unwrap().unwrap().credits, 0);
    }
}
