pub mod handlers;
pub mod types;

use crate::account::AccountNumber;
use crate::error::LedgerError;
use crate::service::LedgerService;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use types::ErrorResponse;

#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService,
}

/// Account number proven by a valid `Authorization: Bearer` access token.
pub struct Authenticated(pub AccountNumber);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(LedgerError::Unauthorized)?;
        state.ledger.authenticate(token).map(Authenticated)
    }
}

pub(crate) fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidAmount(_)
        | LedgerError::NegativeBalance(_)
        | LedgerError::InvalidField(_)
        | LedgerError::SameAccount
        | LedgerError::BalanceOverflow(_) => StatusCode::BAD_REQUEST,
        LedgerError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientFunds { .. } | LedgerError::DuplicateAccountNumber(_) => {
            StatusCode::CONFLICT
        }
        LedgerError::Contention { .. } => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        LedgerError::InvalidCredentials | LedgerError::Unauthorized => StatusCode::UNAUTHORIZED,
        LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
        LedgerError::StoreUnavailable(_) | LedgerError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(code = self.code(), "request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/account", post(handlers::create_account))
        .route(
            "/account/:number",
            get(handlers::get_account).delete(handlers::delete_account),
        )
        .route("/login", post(handlers::login))
        .route("/transfer", post(handlers::transfer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct ApiServer {
    state: AppState,
    bind_addr: String,
}

impl ApiServer {
    pub fn new(ledger: LedgerService, bind_addr: String) -> Self {
        Self {
            state: AppState { ledger },
            bind_addr,
        }
    }

    pub async fn start(self) -> std::io::Result<()> {
        let app = router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;

        info!("HTTP server listening on {}", self.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
