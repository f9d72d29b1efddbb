//! Credential hashing for accounts

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use crate::error::LedgerError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),
    #[error("Password does not match")]
    InvalidPassword,
    #[error("Stored credential is malformed")]
    MalformedHash,
    #[error("Token encoding failed: {0}")]
    TokenEncoding(String),
    #[error("Token rejected: {0}")]
    TokenRejected(String),
}

/// Argon2id PHC string for an account password.
///
/// Only ever compared through [`CredentialHash::verify`]; the raw string
/// does not leave the crate and is redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHash(String);

impl CredentialHash {
    /// Hash a password using Argon2id with a fresh random salt
    pub fn hash(password: &str) -> Result<Self, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashingFailed(e.to_string()))?
            .to_string();
        Ok(Self(hash))
    }

    pub fn verify(&self, password: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(&self.0).map_err(|_| AuthError::MalformedHash)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidPassword)
    }

    pub(crate) fn from_stored(hash: String) -> Self {
        Self(hash)
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialHash(<redacted>)")
    }
}

impl From<AuthError> for LedgerError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidPassword | AuthError::MalformedHash => LedgerError::InvalidCredentials,
            AuthError::TokenRejected(_) => LedgerError::Unauthorized,
            AuthError::HashingFailed(reason) | AuthError::TokenEncoding(reason) => {
                LedgerError::Internal(reason)
            }
        }
    }
}
