//! Account module
//!
//! - account rows and their public numbers
//! - Argon2id credentials and JWT bearer tokens
//! - number allocation with collision retry
//! - the durable store and its atomic balance primitive

pub mod auth;
pub mod number;
pub mod store;
pub mod token;
pub mod types;

pub use auth::{AuthError, CredentialHash};
pub use number::NumberAllocator;
pub use store::{AccountStore, BalanceDelta, RocksAccountStore, StoreError};
pub use token::{Authenticator, TokenPair};
pub use types::{Account, AccountKey, AccountNumber, NewAccount, ACCOUNT_NUMBER_MAX, ACCOUNT_NUMBER_MIN};
