use super::types::*;
use super::{AppState, Authenticated};
use crate::account::AccountNumber;
use crate::error::LedgerError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

/// Callers may only act on the account their token was issued for.
fn ensure_owner(caller: AccountNumber, number: AccountNumber) -> Result<(), LedgerError> {
    if caller != number {
        return Err(LedgerError::Forbidden(number));
    }
    Ok(())
}

pub async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let account = state
        .ledger
        .create_account(req.first_name, req.last_name, req.password, req.balance)
        .await?;
    let token = state.ledger.issue_access_token(account.number)?;

    Ok((
        StatusCode::CREATED,
        [(AUTHORIZATION, format!("Bearer {}", token))],
        Json(CreateAccountResponse {
            first_name: account.first_name,
            last_name: account.last_name,
            number: account.number,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, LedgerError> {
    let tokens = state.ledger.login(req.number, req.password).await?;
    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        status: "ok".to_string(),
    }))
}

pub async fn get_account(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(number): Path<AccountNumber>,
) -> Result<Json<AccountResponse>, LedgerError> {
    ensure_owner(caller, number)?;
    let account = state.ledger.get_account(number).await?;
    Ok(Json(account.into()))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(number): Path<AccountNumber>,
) -> Result<Json<DeleteAccountResponse>, LedgerError> {
    ensure_owner(caller, number)?;
    state.ledger.delete_account(number).await?;
    Ok(Json(DeleteAccountResponse {
        status: "deleted".to_string(),
        number,
    }))
}

fn unsuccessful(status: StatusCode, error: String, code: &str) -> Response {
    (
        status,
        Json(TransferResponse {
            status: TransferStatus::Unsuccessful,
            transfer_id: None,
            error: Some(error),
            code: Some(code.to_string()),
        }),
    )
        .into_response()
}

/// Always answers with a transfer envelope, so a rejected transfer still
/// carries `status: Unsuccessful` alongside the reason. That includes
/// bodies that fail to parse.
pub async fn transfer(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "malformed transfer request");
            return unsuccessful(rejection.status(), rejection.body_text(), "invalid_request");
        }
    };

    let result = match ensure_owner(caller, req.from_account) {
        Ok(()) => {
            state
                .ledger
                .transfer(req.from_account, req.to_account, req.amount)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(receipt) => {
            debug!(transfer_id = %receipt.transfer_id, "transfer accepted");
            (
                StatusCode::OK,
                Json(TransferResponse {
                    status: TransferStatus::Successful,
                    transfer_id: Some(receipt.transfer_id),
                    error: None,
                    code: None,
                }),
            )
                .into_response()
        }
        Err(e) => unsuccessful(super::status_for(&e), e.to_string(), e.code()),
    }
}
