//! Account storage and management

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use super::auth::CredentialHash;
use super::types::{
    is_valid_number, Account, AccountKey, AccountNumber, AccountRecord, NewAccount, NumberSlot,
};
use crate::error::LedgerError;
use crate::storage::{CancelSignal, Storage, StorageError, UnitOfWork};

const NEXT_ID_KEY: &str = "meta:next_id";

pub(crate) fn row_key(id: AccountKey) -> String {
    format!("account:{:020}", id)
}

fn number_key(number: AccountNumber) -> String {
    format!("number:{}", number)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account {0} does not exist")]
    NotFound(AccountNumber),
    #[error("Account number {0} is already taken")]
    Duplicate(AccountNumber),
    #[error("Account number {0} is outside the 8-digit range")]
    OutOfRange(AccountNumber),
    #[error("Both legs of the adjustment target account {0}")]
    SameAccount(AccountNumber),
    #[error("Insufficient funds in account {number}: have {available}, need {required}")]
    InsufficientFunds {
        number: AccountNumber,
        available: i64,
        required: i64,
    },
    #[error("Balance of account {0} would overflow")]
    Overflow(AccountNumber),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Cancelled before commit")]
    Cancelled,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(reason) => StoreError::Conflict(reason),
            StorageError::Cancelled => StoreError::Cancelled,
            StorageError::Database(reason) | StorageError::Codec(reason) => {
                StoreError::Unavailable(reason)
            }
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(number) => LedgerError::AccountNotFound(number),
            StoreError::Duplicate(number) => LedgerError::DuplicateAccountNumber(number),
            StoreError::OutOfRange(number) => {
                LedgerError::Internal(format!("account number {} out of range", number))
            }
            StoreError::SameAccount(_) => LedgerError::SameAccount,
            StoreError::InsufficientFunds {
                number,
                available,
                required,
            } => LedgerError::InsufficientFunds {
                number,
                available,
                required,
            },
            StoreError::Overflow(number) => LedgerError::BalanceOverflow(number),
            StoreError::Conflict(_) => LedgerError::Contention { attempts: 1 },
            StoreError::Cancelled => LedgerError::Cancelled,
            StoreError::Unavailable(reason) => LedgerError::StoreUnavailable(reason),
        }
    }
}

/// One leg of a balance adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub number: AccountNumber,
    pub delta: i64,
}

/// Durable account rows.
///
/// `adjust_balances` is the only way to change a balance after creation.
pub trait AccountStore: Send + Sync {
    fn create(&self, number: AccountNumber, account: &NewAccount) -> Result<Account, StoreError>;

    fn get(&self, number: AccountNumber) -> Result<Account, StoreError>;

    fn delete(&self, number: AccountNumber) -> Result<(), StoreError>;

    fn credential(&self, number: AccountNumber) -> Result<CredentialHash, StoreError>;

    /// Apply both deltas as one atomic unit of work. Fails without writing
    /// anything if either account is missing or would end up negative.
    fn adjust_balances(
        &self,
        first: BalanceDelta,
        second: BalanceDelta,
        cancel: &CancelSignal,
    ) -> Result<(), StoreError>;
}

/// Row lock acquisition order for a pair of accounts: ascending internal
/// key, whatever the direction of the transfer.
pub fn lock_order(a: AccountKey, b: AccountKey) -> (AccountKey, AccountKey) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn apply_delta(record: &mut AccountRecord, delta: i64) -> Result<(), StoreError> {
    let updated = record
        .balance
        .checked_add(delta)
        .ok_or(StoreError::Overflow(record.number))?;
    if updated < 0 {
        return Err(StoreError::InsufficientFunds {
            number: record.number,
            available: record.balance,
            required: delta.saturating_neg(),
        });
    }
    record.balance = updated;
    Ok(())
}

/// RocksDB-backed account store
pub struct RocksAccountStore {
    storage: Arc<Storage>,
}

impl RocksAccountStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Resolve a number to its row key under a shared lock on the number slot.
    fn live_key(&self, uow: &UnitOfWork<'_>, number: AccountNumber) -> Result<AccountKey, StoreError> {
        match uow.get_shared::<NumberSlot>(&number_key(number))? {
            Some(NumberSlot::Live(id)) => Ok(id),
            Some(NumberSlot::Retired) | None => Err(StoreError::NotFound(number)),
        }
    }

    fn load(&self, number: AccountNumber) -> Result<AccountRecord, StoreError> {
        let id = match self.storage.get::<NumberSlot>(&number_key(number))? {
            Some(NumberSlot::Live(id)) => id,
            Some(NumberSlot::Retired) | None => return Err(StoreError::NotFound(number)),
        };
        self.storage
            .get::<AccountRecord>(&row_key(id))?
            .ok_or(StoreError::NotFound(number))
    }
}

impl AccountStore for RocksAccountStore {
    fn create(&self, number: AccountNumber, account: &NewAccount) -> Result<Account, StoreError> {
        if !is_valid_number(number) {
            return Err(StoreError::OutOfRange(number));
        }

        let uow = self.storage.begin();
        if uow.get_for_update::<NumberSlot>(&number_key(number))?.is_some() {
            return Err(StoreError::Duplicate(number));
        }

        let id = uow.get_for_update::<AccountKey>(NEXT_ID_KEY)?.unwrap_or(1);
        uow.put(NEXT_ID_KEY, &(id + 1))?;

        let record = AccountRecord {
            id,
            number,
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            password_hash: account.credential.as_str().to_string(),
            balance: account.balance,
            created_at: Utc::now(),
        };
        uow.put(&row_key(id), &record)?;
        uow.put(&number_key(number), &NumberSlot::Live(id))?;
        uow.commit(&CancelSignal::new())?;

        debug!(id, number, "account created");
        Ok(record.to_account())
    }

    fn get(&self, number: AccountNumber) -> Result<Account, StoreError> {
        self.load(number).map(|record| record.to_account())
    }

    fn delete(&self, number: AccountNumber) -> Result<(), StoreError> {
        let uow = self.storage.begin();
        let id = match uow.get_for_update::<NumberSlot>(&number_key(number))? {
            Some(NumberSlot::Live(id)) => id,
            Some(NumberSlot::Retired) | None => return Err(StoreError::NotFound(number)),
        };
        // wait out any transfer still holding the row
        uow.get_for_update::<AccountRecord>(&row_key(id))?;
        uow.delete(&row_key(id))?;
        uow.put(&number_key(number), &NumberSlot::Retired)?;
        uow.commit(&CancelSignal::new())?;

        debug!(id, number, "account deleted, number retired");
        Ok(())
    }

    fn credential(&self, number: AccountNumber) -> Result<CredentialHash, StoreError> {
        self.load(number)
            .map(|record| CredentialHash::from_stored(record.password_hash))
    }

    fn adjust_balances(
        &self,
        first: BalanceDelta,
        second: BalanceDelta,
        cancel: &CancelSignal,
    ) -> Result<(), StoreError> {
        if first.number == second.number {
            return Err(StoreError::SameAccount(first.number));
        }

        let uow = self.storage.begin();
        let first_id = self.live_key(&uow, first.number)?;
        let second_id = self.live_key(&uow, second.number)?;

        let (lo, hi) = lock_order(first_id, second_id);
        trace!(lo, hi, "locking account rows");
        let lo_record = uow.get_for_update::<AccountRecord>(&row_key(lo))?;
        let hi_record = uow.get_for_update::<AccountRecord>(&row_key(hi))?;

        let (first_record, second_record) = if lo == first_id {
            (lo_record, hi_record)
        } else {
            (hi_record, lo_record)
        };
        let mut first_record = first_record.ok_or(StoreError::NotFound(first.number))?;
        let mut second_record = second_record.ok_or(StoreError::NotFound(second.number))?;
        if cancel.is_fired() {
            return Err(StoreError::Cancelled);
        }

        // debit legs are checked first so an overdraft reports as such
        // rather than as an overflow on the other side
        if first.delta <= second.delta {
            apply_delta(&mut first_record, first.delta)?;
            apply_delta(&mut second_record, second.delta)?;
        } else {
            apply_delta(&mut second_record, second.delta)?;
            apply_delta(&mut first_record, first.delta)?;
        }

        uow.put(&row_key(first_id), &first_record)?;
        uow.put(&row_key(second_id), &second_record)?;
        uow.commit(cancel)?;
        Ok(())
    }
}
