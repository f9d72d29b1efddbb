//! Account type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::CredentialHash;

/// Public 8-digit account identifier
pub type AccountNumber = i64;

/// Internal surrogate key assigned by the store
pub type AccountKey = u64;

pub const ACCOUNT_NUMBER_MIN: AccountNumber = 10_000_000;
pub const ACCOUNT_NUMBER_MAX: AccountNumber = 99_999_999;

pub fn is_valid_number(number: AccountNumber) -> bool {
    (ACCOUNT_NUMBER_MIN..=ACCOUNT_NUMBER_MAX).contains(&number)
}

/// Account as seen outside the store. Carries no credential material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountKey,
    pub number: AccountNumber,
    pub first_name: String,
    pub last_name: String,
    /// Smallest currency unit, never negative
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for account creation; the number is supplied by the allocator.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub credential: CredentialHash,
    pub balance: i64,
}

/// Persisted row layout
#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct AccountRecord {
    pub id: AccountKey,
    pub number: AccountNumber,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn to_account(&self) -> Account {
        Account {
            id: self.id,
            number: self.number,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            balance: self.balance,
            created_at: self.created_at,
        }
    }
}

/// State of an account number. Deleting an account retires its number
/// instead of freeing it, so numbers are never handed out twice.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NumberSlot {
    Live(AccountKey),
    Retired,
}
