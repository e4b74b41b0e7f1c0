use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tally_core::{AccountId, LedgerError};

use crate::app::dto::{RequestError, ValidationError};

/// Which side of an operation an account lookup was for; only affects the message.
#[derive(Debug, Copy, Clone)]
pub enum AccountRole {
    Account,
    Source,
    Target,
}

impl AccountRole {
    fn label(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Source => "source account",
            Self::Target => "target account",
        }
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    ledger_error_for(AccountRole::Account, err)
}

pub fn ledger_error_for(role: AccountRole, err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::NotFound(id) => not_found(role, id),
        LedgerError::InsufficientFunds { .. } => {
            tracing::warn!(error = %err, "transfer rejected");
            json_error(StatusCode::BAD_REQUEST, "insufficient_funds", err.to_string())
        }
        LedgerError::Storage(ref reason) => {
            tracing::error!(%reason, "ledger operation failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "could not process the request",
            )
        }
    }
}

pub fn not_found(role: AccountRole, id: AccountId) -> axum::response::Response {
    tracing::warn!(account_id = %id, role = role.label(), "account does not exist");
    json_error(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("{} with id={id} does not exist", role.label()),
    )
}

pub fn request_error_to_response(err: RequestError) -> axum::response::Response {
    tracing::warn!(error = %err, "cannot parse request");
    json_error(StatusCode::BAD_REQUEST, "bad_request", err.to_string())
}

pub fn validation_error_to_response(err: ValidationError) -> axum::response::Response {
    tracing::warn!(error = %err, "invalid request data");
    json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
