use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use tally_core::AccountId;

use crate::app::dto::{self, TopUpRequest, TransferRequest};
use crate::app::errors::{self, AccountRole};
use crate::app::services::AppServices;

pub async fn open_account(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ledger().open().await {
        Ok(id) => {
            tracing::info!(account_id = %id, "account opened");
            (StatusCode::CREATED, id.to_string()).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw_id): Path<String>,
) -> axum::response::Response {
    let id: AccountId = match raw_id.parse() {
        Ok(id) => id,
        Err(e) => return errors::request_error_to_response(e.into()),
    };

    match services.ledger().find(id).await {
        Ok(account) => (StatusCode::OK, Json(dto::AccountResponse::from(account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn top_up(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let request = match TopUpRequest::parse(&raw_id, &body) {
        Ok(r) => r,
        Err(e) => return errors::request_error_to_response(e),
    };
    let top_up = match request.validate() {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };

    let ledger = services.ledger();
    if let Err(e) = ledger.find(top_up.target).await {
        return errors::ledger_error_for(AccountRole::Target, e);
    }
    if let Err(e) = ledger.credit(top_up.target, top_up.amount).await {
        return errors::ledger_error_for(AccountRole::Target, e);
    }

    tracing::info!(account_id = %top_up.target, amount = top_up.amount, "account topped up");
    StatusCode::OK.into_response()
}

pub async fn transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let request = match TransferRequest::parse(&raw_id, &body) {
        Ok(r) => r,
        Err(e) => return errors::request_error_to_response(e),
    };
    let transfer = match request.validate() {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };

    let ledger = services.ledger();
    if let Err(e) = ledger.find(transfer.source).await {
        return errors::ledger_error_for(AccountRole::Source, e);
    }
    if let Err(e) = ledger.find(transfer.target).await {
        return errors::ledger_error_for(AccountRole::Target, e);
    }

    match ledger.transfer(transfer.source, transfer.target, transfer.amount).await {
        Ok(()) => {
            tracing::info!(
                source = %transfer.source,
                target = %transfer.target,
                amount = transfer.amount,
                "transfer completed"
            );
            StatusCode::OK.into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
