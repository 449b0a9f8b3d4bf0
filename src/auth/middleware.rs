//! Session gate
//!
//! Protects routes that require authentication.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::TOKEN_COOKIE;
use super::token::Claims;
use crate::AppState;
use crate::error::AppError;

/// Verify the credential carried in the `token` cookie.
///
/// Any verification failure is collapsed into `InvalidToken`.
pub fn authenticate(jar: &CookieJar, state: &AppState) -> Result<Claims, AppError> {
    let token = jar
        .get(TOKEN_COOKIE)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    state.tokens.verify(token).map_err(|reason| {
        tracing::debug!(%reason, "Credential rejected");
        AppError::InvalidToken
    })
}

/// Middleware to require authentication
///
/// Verifies the credential cookie on every request and adds the decoded
/// [`Claims`] to request extensions. Rejected requests never reach the
/// handler.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/transactions", ...)
///     .route_layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&jar, &state)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extractor for the identity attached by [`require_auth`]
///
/// Handlers take the owner id for every read and write from here, never
/// from request input.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(claims): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", claims.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    /// Only succeeds behind the session gate
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::Unauthenticated)
    }
}
