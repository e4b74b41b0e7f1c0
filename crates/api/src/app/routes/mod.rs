use axum::{
    routing::{get, post},
    Router,
};

pub mod accounts;
pub mod system;

/// Router for the account endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/accounts", post(accounts::open_account))
        .route("/account/:id", get(accounts::get_account))
        .route("/account/:id/topup", post(accounts::top_up))
        .route("/account/:id/transfer", post(accounts::transfer))
}
