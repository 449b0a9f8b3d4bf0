//! Transaction endpoints
//!
//! Every query is scoped to the authenticated caller.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;

use super::dto::{CreateTransactionRequest, TransactionResponse, parse_date};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{EntityId, Transaction};
use crate::error::AppError;
use crate::metrics::TRANSACTIONS_CREATED_TOTAL;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Only entries on this date (YYYY-MM-DD)
    pub date: Option<String>,
}

/// GET /transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let date = params
        .date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(parse_date)
        .transpose()?;

    let transactions = state.db.list_transactions(&claims.id, date).await?;

    Ok(Json(
        transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
    ))
}

/// POST /transactions
pub async fn create_transaction(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    body: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let Json(body) = body?;
    let input = body.validate()?;

    let transaction = Transaction {
        id: EntityId::new().0,
        user_id: claims.id,
        taken_amnt: input.taken_amnt,
        cltn_amnt: input.cltn_amnt,
        datee: input.datee,
        created_at: Utc::now(),
    };
    state.db.insert_transaction(&transaction).await?;
    TRANSACTIONS_CREATED_TOTAL.inc();

    tracing::debug!(
        transaction_id = %transaction.id,
        user_id = %transaction.user_id,
        "Transaction created"
    );

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// DELETE /transactions/:id
///
/// Foreign and missing ids both answer 404.
pub async fn delete_transaction(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.db.delete_transaction(&claims.id, &id).await? {
        return Err(AppError::NotFound);
    }

    tracing::debug!(transaction_id = %id, user_id = %claims.id, "Transaction deleted");
    Ok(StatusCode::NO_CONTENT)
}
