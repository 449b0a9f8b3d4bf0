//! Current-user endpoint

use axum::{extract::State, response::Json};

use super::dto::UserResponse;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// GET /me
///
/// A credential whose user no longer exists is treated as no credential.
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .db
        .get_user(&claims.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    Ok(Json(user.into()))
}
