//! Ledger service: the async call boundary in front of the store and the
//! transfer engine.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::account::{
    Account, AccountNumber, AccountStore, Authenticator, CredentialHash, NewAccount,
    NumberAllocator, StoreError, TokenPair,
};
use crate::error::LedgerError;
use crate::storage::CancelSignal;
use crate::transfer::{TransferEngine, TransferReceipt};

const MAX_NAME_LEN: usize = 50;

/// Run blocking store work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, LedgerError>
where
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LedgerError::Internal(format!("blocking task failed: {}", e)))?
}

fn validate_name(field: &str, value: &str) -> Result<(), LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(LedgerError::InvalidField(format!(
            "{} must be 1 to {} characters",
            field, MAX_NAME_LEN
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn AccountStore>,
    engine: Arc<TransferEngine>,
    allocator: NumberAllocator,
    authenticator: Arc<Authenticator>,
    transfer_deadline: Duration,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        engine: Arc<TransferEngine>,
        allocator: NumberAllocator,
        authenticator: Arc<Authenticator>,
        transfer_deadline: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            allocator,
            authenticator,
            transfer_deadline,
        }
    }

    pub async fn create_account(
        &self,
        first_name: String,
        last_name: String,
        password: String,
        balance: i64,
    ) -> Result<Account, LedgerError> {
        validate_name("first_name", &first_name)?;
        validate_name("last_name", &last_name)?;
        if password.is_empty() {
            return Err(LedgerError::InvalidField("password must not be empty".to_string()));
        }
        if balance < 0 {
            return Err(LedgerError::NegativeBalance(balance));
        }

        let store = self.store.clone();
        let allocator = self.allocator;
        let account = blocking(move || {
            let new_account = NewAccount {
                first_name: first_name.trim().to_string(),
                last_name: last_name.trim().to_string(),
                credential: CredentialHash::hash(&password)?,
                balance,
            };
            let mut rng = rand::thread_rng();
            allocator
                .allocate(&mut rng, |number| store.create(number, &new_account))
                .map_err(LedgerError::from)
        })
        .await?;

        info!(number = account.number, "account created");
        Ok(account)
    }

    pub async fn get_account(&self, number: AccountNumber) -> Result<Account, LedgerError> {
        let store = self.store.clone();
        blocking(move || store.get(number).map_err(LedgerError::from)).await
    }

    pub async fn delete_account(&self, number: AccountNumber) -> Result<(), LedgerError> {
        let store = self.store.clone();
        blocking(move || store.delete(number).map_err(LedgerError::from)).await?;
        info!(number, "account deleted");
        Ok(())
    }

    /// Verify the password with Argon2 and issue an access/refresh pair.
    /// Unknown accounts and wrong passwords are indistinguishable.
    pub async fn login(
        &self,
        number: AccountNumber,
        password: String,
    ) -> Result<TokenPair, LedgerError> {
        let store = self.store.clone();
        let authenticator = self.authenticator.clone();
        blocking(move || {
            let credential = store.credential(number).map_err(|e| match e {
                StoreError::NotFound(_) => LedgerError::InvalidCredentials,
                other => other.into(),
            })?;
            credential.verify(&password)?;
            Ok(authenticator.issue(number)?)
        })
        .await
        .inspect_err(|e| debug!(number, error = %e, "login refused"))
    }

    pub fn issue_access_token(&self, number: AccountNumber) -> Result<String, LedgerError> {
        Ok(self.authenticator.issue_access(number)?)
    }

    pub fn authenticate(&self, token: &str) -> Result<AccountNumber, LedgerError> {
        Ok(self.authenticator.authenticate(token)?)
    }

    /// Transfer bounded by the configured deadline.
    pub async fn transfer(
        &self,
        from: AccountNumber,
        to: AccountNumber,
        amount: i64,
    ) -> Result<TransferReceipt, LedgerError> {
        let signal = CancelSignal::with_deadline(Instant::now() + self.transfer_deadline);
        self.transfer_with_signal(from, to, amount, signal).await
    }

    /// Transfer that the caller can abort through `signal`. If the deadline
    /// passes while the unit of work is still running, the signal is fired
    /// and the real outcome is awaited: either the commit already happened,
    /// or the work rolls back and reports `Cancelled`.
    pub async fn transfer_with_signal(
        &self,
        from: AccountNumber,
        to: AccountNumber,
        amount: i64,
        signal: CancelSignal,
    ) -> Result<TransferReceipt, LedgerError> {
        let engine = self.engine.clone();
        let worker_signal = signal.clone();
        let mut task =
            tokio::task::spawn_blocking(move || engine.transfer(from, to, amount, &worker_signal));

        let joined = match tokio::time::timeout(self.transfer_deadline, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(from, to, "transfer deadline elapsed, cancelling");
                signal.cancel();
                task.await
            }
        };
        joined.map_err(|e| LedgerError::Internal(format!("transfer task failed: {}", e)))?
    }
}
