//! Transfer engine: moves funds between two accounts as one atomic unit.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::account::{AccountNumber, AccountStore, BalanceDelta, StoreError};
use crate::error::LedgerError;
use crate::storage::CancelSignal;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Sleep before attempt `n + 1` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub from: AccountNumber,
    pub to: AccountNumber,
    pub amount: i64,
    pub attempts: u32,
}

pub struct TransferEngine {
    store: Arc<dyn AccountStore>,
    policy: RetryPolicy,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn AccountStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Blocking. Every attempt opens a fresh unit of work and re-reads both
    /// balances; nothing from a failed attempt is carried into the next.
    pub fn transfer(
        &self,
        from: AccountNumber,
        to: AccountNumber,
        amount: i64,
        cancel: &CancelSignal,
    ) -> Result<TransferReceipt, LedgerError> {
        let transfer_id = Uuid::new_v4();
        let span = info_span!("transfer", %transfer_id, from, to, amount);
        let _enter = span.enter();

        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if from == to {
            return Err(LedgerError::SameAccount);
        }

        let debit = BalanceDelta {
            number: from,
            delta: -amount,
        };
        let credit = BalanceDelta {
            number: to,
            delta: amount,
        };
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_fired() {
                debug!(attempt, "cancelled before attempt");
                return Err(LedgerError::Cancelled);
            }

            match self.store.adjust_balances(debit, credit, cancel) {
                Ok(()) => {
                    info!(attempt, "transfer committed");
                    return Ok(TransferReceipt {
                        transfer_id,
                        from,
                        to,
                        amount,
                        attempts: attempt,
                    });
                }
                Err(StoreError::Conflict(reason)) if attempt < max_attempts => {
                    debug!(attempt, %reason, "conflict, retrying");
                    thread::sleep(self.policy.backoff * attempt);
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(attempt, %reason, "giving up after repeated conflicts");
                    return Err(LedgerError::Contention { attempts: attempt });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "transfer rejected");
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, CredentialHash, NewAccount, RocksAccountStore};
    use crate::storage::Storage;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Wraps a real store and fails the first `conflicts` adjustments.
    struct FlakyStore {
        inner: RocksAccountStore,
        conflicts: u32,
        calls: AtomicU32,
    }

    impl AccountStore for FlakyStore {
        fn create(&self, number: AccountNumber, account: &NewAccount) -> Result<Account, StoreError> {
            self.inner.create(number, account)
        }

        fn get(&self, number: AccountNumber) -> Result<Account, StoreError> {
            self.inner.get(number)
        }

        fn delete(&self, number: AccountNumber) -> Result<(), StoreError> {
            self.inner.delete(number)
        }

        fn credential(&self, number: AccountNumber) -> Result<CredentialHash, StoreError> {
            self.inner.credential(number)
        }

        fn adjust_balances(
            &self,
            first: BalanceDelta,
            second: BalanceDelta,
            cancel: &CancelSignal,
        ) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.conflicts {
                return Err(StoreError::Conflict("injected".to_string()));
            }
            self.inner.adjust_balances(first, second, cancel)
        }
    }

    const A: AccountNumber = 11_111_111;
    const B: AccountNumber = 22_222_222;

    fn seeded_store(dir: &tempfile::TempDir) -> RocksAccountStore {
        let storage = Arc::new(Storage::open(dir.path(), 100).unwrap());
        let store = RocksAccountStore::new(storage);
        for (number, balance) in [(A, 1000), (B, 0)] {
            store
                .create(
                    number,
                    &NewAccount {
                        first_name: "test".to_string(),
                        last_name: "account".to_string(),
                        credential: CredentialHash::from_stored("$argon2id$x".to_string()),
                        balance,
                    },
                )
                .unwrap();
        }
        store
    }

    fn flaky(dir: &tempfile::TempDir, conflicts: u32) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: seeded_store(dir),
            conflicts,
            calls: AtomicU32::new(0),
        })
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    fn balances(store: &dyn AccountStore) -> (i64, i64) {
        (store.get(A).unwrap().balance, store.get(B).unwrap().balance)
    }

    #[test]
    fn scenario_transfer_then_overdraft_then_self() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn AccountStore> = Arc::new(seeded_store(&dir));
        let engine = TransferEngine::new(store.clone(), RetryPolicy::default());
        let signal = CancelSignal::new();

        let receipt = engine.transfer(A, B, 400, &signal).unwrap();
        assert_eq!(receipt.attempts, 1);
        assert_eq!(balances(store.as_ref()), (600, 400));

        let err = engine.transfer(A, B, 1000, &signal).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { number: A, .. }));
        assert_eq!(balances(store.as_ref()), (600, 400));

        assert_eq!(engine.transfer(A, A, 100, &signal), Err(LedgerError::SameAccount));
        assert_eq!(balances(store.as_ref()), (600, 400));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = flaky(&dir, 0);
        let engine = TransferEngine::new(store.clone(), RetryPolicy::default());

        for amount in [0, -1, i64::MIN] {
            assert_eq!(
                engine.transfer(A, B, amount, &CancelSignal::new()),
                Err(LedgerError::InvalidAmount(amount))
            );
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(balances(store.as_ref()), (1000, 0));
    }

    #[test]
    fn unknown_account_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = flaky(&dir, 0);
        let engine = TransferEngine::new(store.clone(), RetryPolicy::default());
        assert_eq!(
            engine.transfer(A, 33_333_333, 1, &CancelSignal::new()),
            Err(LedgerError::AccountNotFound(33_333_333))
        );
        assert_eq!(balances(store.as_ref()), (1000, 0));
    }

    #[test]
    fn conflicts_are_retried_within_bound() {
        let dir = tempfile::tempdir().unwrap();
        let store = flaky(&dir, 2);
        let engine = TransferEngine::new(store.clone(), policy(3));

        let receipt = engine.transfer(A, B, 10, &CancelSignal::new()).unwrap();
        assert_eq!(receipt.attempts, 3);
        assert_eq!(balances(store.as_ref()), (990, 10));
    }

    #[test]
    fn contention_surfaces_after_bound() {
        let dir = tempfile::tempdir().unwrap();
        let store = flaky(&dir, u32::MAX);
        let engine = TransferEngine::new(store.clone(), policy(4));

        let err = engine.transfer(A, B, 10, &CancelSignal::new()).unwrap_err();
        assert_eq!(err, LedgerError::Contention { attempts: 4 });
        assert!(err.is_retryable());
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        assert_eq!(balances(store.as_ref()), (1000, 0));
    }

    #[test]
    fn validation_failures_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = flaky(&dir, 0);
        let engine = TransferEngine::new(store.clone(), policy(5));

        assert!(engine.transfer(B, A, 1, &CancelSignal::new()).is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_transfer_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = flaky(&dir, 0);
        let engine = TransferEngine::new(store.clone(), RetryPolicy::default());

        let signal = CancelSignal::new();
        signal.cancel();
        assert_eq!(engine.transfer(A, B, 10, &signal), Err(LedgerError::Cancelled));
        assert_eq!(balances(store.as_ref()), (1000, 0));
    }
}
