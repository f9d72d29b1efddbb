use thiserror::Error;

use crate::account::AccountNumber;

/// Outcome taxonomy for every ledger operation.
///
/// Validation errors are terminal. `Contention` is the only one a caller
/// should retry; it is raised after the engine has already exhausted its
/// own attempts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("Initial balance must not be negative, got {0}")]
    NegativeBalance(i64),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Cannot transfer to the same account")]
    SameAccount,
    #[error("Account {0} does not exist")]
    AccountNotFound(AccountNumber),
    #[error("Insufficient funds in account {number}: have {available}, need {required}")]
    InsufficientFunds {
        number: AccountNumber,
        available: i64,
        required: i64,
    },
    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountNumber),
    #[error("Operation was contended after {attempts} attempts, try again")]
    Contention { attempts: u32 },
    #[error("Account number {0} is already taken")]
    DuplicateAccountNumber(AccountNumber),
    #[error("Operation cancelled before commit")]
    Cancelled,
    #[error("Invalid account number or password")]
    InvalidCredentials,
    #[error("Missing or invalid bearer token")]
    Unauthorized,
    #[error("Token does not grant access to account {0}")]
    Forbidden(AccountNumber),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable machine-readable code for response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::NegativeBalance(_) => "negative_balance",
            Self::InvalidField(_) => "invalid_field",
            Self::SameAccount => "same_account",
            Self::AccountNotFound(_) => "account_not_found",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::BalanceOverflow(_) => "balance_overflow",
            Self::Contention { .. } => "contention",
            Self::DuplicateAccountNumber(_) => "duplicate_account_number",
            Self::Cancelled => "cancelled",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }
}
