//! API layer
//!
//! JSON handlers for the ledger frontend:
//! - `/me` current user
//! - `/transactions` per-user ledger entries
//! - `/metrics` Prometheus scrape

mod account;
mod dto;
pub mod metrics;
mod transactions;

pub use dto::*;
pub use metrics::metrics_router;

use axum::{
    Router, middleware,
    routing::{delete, get},
};

use crate::AppState;
use crate::auth::require_auth;

/// Routes that require a valid credential cookie
///
/// Routes:
/// - GET /me
/// - GET /transactions
/// - POST /transactions
/// - DELETE /transactions/:id
pub fn protected_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(account::me))
        .route(
            "/transactions",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route("/transactions/:id", delete(transactions::delete_transaction))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
