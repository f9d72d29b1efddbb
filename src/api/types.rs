// Request/response shapes for the HTTP API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::{Account, AccountNumber};

#[derive(Deserialize, Debug)]
pub struct CreateAccountRequest {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    #[serde(default)]
    pub balance: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateAccountResponse {
    pub first_name: String,
    pub last_name: String,
    pub number: AccountNumber,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub first_name: String,
    pub last_name: String,
    pub number: AccountNumber,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            first_name: account.first_name,
            last_name: account.last_name,
            number: account.number,
            balance: account.balance,
            created_at: account.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DeleteAccountResponse {
    pub status: String,
    pub number: AccountNumber,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub number: AccountNumber,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub status: String,
}

#[derive(Deserialize, Debug)]
pub struct TransferRequest {
    pub from_account: AccountNumber,
    pub to_account: AccountNumber,
    pub amount: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Successful,
    Unsuccessful,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferResponse {
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
