//! OAuth redirect flow
//!
//! Implements the OAuth 2.0 authorization code flow with Google and GitHub:
//! initiate, provider callback, credential cookie, redirect into the app.

use axum::{
    Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::Deserialize;

use super::provider::{ProfileExchange, Provider};
use super::token::TokenIssuer;
use super::{STATE_COOKIE, TOKEN_COOKIE};
use crate::AppState;
use crate::config::AppConfig;
use crate::data::User;
use crate::error::AppError;
use crate::metrics::LOGINS_TOTAL;
use crate::service::IdentityService;

/// Lifetime of the CSRF state cookie
const STATE_MAX_AGE_SECS: i64 = 600;

/// Create authentication router
///
/// Routes:
/// - GET /auth/:provider - Redirect to the provider consent screen
/// - GET /auth/:provider/callback - OAuth callback
/// - POST /logout - Clear the credential cookie
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/:provider", get(begin_login))
        .route("/auth/:provider/callback", get(oauth_callback))
        .route("/logout", post(logout))
}

// =============================================================================
// Cookies
// =============================================================================

fn same_site(config: &AppConfig) -> SameSite {
    if config.should_use_secure_cookies() {
        SameSite::None
    } else {
        SameSite::Lax
    }
}

/// HTTP-only credential cookie, lifetime matching the token TTL
pub fn credential_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(config.should_use_secure_cookies())
        .same_site(same_site(config))
        .max_age(time::Duration::seconds(config.auth.token_max_age))
        .build()
}

/// Removal for the credential cookie; attributes match [`credential_cookie`]
fn credential_removal(config: &AppConfig) -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE)
        .path("/")
        .http_only(true)
        .secure(config.should_use_secure_cookies())
        .same_site(same_site(config))
        .build()
}

fn state_cookie(config: &AppConfig, value: String) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, value))
        .path("/auth")
        .http_only(true)
        .secure(config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(STATE_MAX_AGE_SECS))
        .build()
}

fn state_removal() -> Cookie<'static> {
    Cookie::build(STATE_COOKIE).path("/auth").build()
}

// =============================================================================
// Initiate
// =============================================================================

fn parse_provider(raw: &str) -> Result<Provider, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

/// GET /auth/:provider
///
/// Redirects the browser to the provider's consent screen.
///
/// # Steps
/// 1. Generate CSRF state token
/// 2. Store state in a short-lived cookie
/// 3. Redirect with client_id, redirect_uri, scope, state
async fn begin_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let provider = parse_provider(&provider)?;

    let Some(client) = state.config.auth.client(provider) else {
        tracing::warn!(provider = %provider, "Login attempted for unconfigured provider");
        let code = AppError::ProviderNotConfigured(provider.to_string()).login_error_code();
        return Ok(Redirect::to(&state.config.frontend.login_error_url(code)).into_response());
    };

    let csrf_state = generate_csrf_state();
    let redirect_uri = state.config.auth.redirect_uri(provider);
    let url = provider.authorization_url(&client.client_id, &redirect_uri, &csrf_state);

    tracing::debug!(provider = %provider, "Redirecting to provider consent screen");

    let jar = jar.add(state_cookie(&state.config, csrf_state));
    Ok((jar, Redirect::to(&url)).into_response())
}

// =============================================================================
// Callback
// =============================================================================

/// Query parameters from the provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set by the provider when consent was denied
    error: Option<String>,
}

/// GET /auth/:provider/callback
///
/// # Steps
/// 1. Verify CSRF state
/// 2. Exchange code for a profile
/// 3. Resolve or create the local user
/// 4. Issue a credential and set it as a cookie
/// 5. Redirect to the landing route
///
/// Every failure redirects to the login route with an error code.
async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let provider = parse_provider(&provider)?;

    let outcome = match query {
        Err(rejection) => Err(AppError::ProviderAuthFailure(format!(
            "unreadable callback query: {}",
            rejection.body_text()
        ))),
        Ok(Query(query)) => callback_outcome(&state, provider, &query, &jar).await,
    };

    let jar = jar.remove(state_removal());

    match outcome {
        Ok((user, token)) => {
            LOGINS_TOTAL
                .with_label_values(&[provider.as_str(), "success"])
                .inc();
            tracing::info!(user_id = %user.id, provider = %provider, "Login succeeded");

            let jar = jar.add(credential_cookie(&state.config, token));
            Ok((jar, Redirect::to(&state.config.frontend.landing_url())).into_response())
        }
        Err(error) => {
            LOGINS_TOTAL
                .with_label_values(&[provider.as_str(), "failure"])
                .inc();
            tracing::warn!(provider = %provider, %error, "Login failed");

            let url = state
                .config
                .frontend
                .login_error_url(error.login_error_code());
            Ok((jar, Redirect::to(&url)).into_response())
        }
    }
}

/// CSRF check, then provider error or code, then [`complete_login`]
async fn callback_outcome(
    state: &AppState,
    provider: Provider,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<(User, String), AppError> {
    verify_csrf_state(query.state.as_deref(), jar)?;

    match (query.error.as_deref(), query.code.as_deref()) {
        (Some(_), _) => Err(AppError::ProviderAuthFailure(
            "provider returned an error".to_string(),
        )),
        (None, None) => Err(AppError::ProviderAuthFailure(
            "callback without authorization code".to_string(),
        )),
        (None, Some(code)) => {
            complete_login(
                state.profiles.as_ref(),
                &state.identity,
                &state.tokens,
                provider,
                code,
            )
            .await
        }
    }
}

/// Exchange, link, issue. Nothing is persisted beyond the identity link,
/// so a failure at any step leaves the browser without a credential.
pub async fn complete_login(
    profiles: &dyn ProfileExchange,
    identity: &IdentityService,
    tokens: &TokenIssuer,
    provider: Provider,
    code: &str,
) -> Result<(User, String), AppError> {
    let profile = profiles.exchange_code_for_profile(provider, code).await?;
    let user = identity.link_profile(&profile).await?;
    let token = tokens.issue(&user)?;
    Ok((user, token))
}

// =============================================================================
// Logout
// =============================================================================

/// POST /logout
///
/// Clears the credential cookie. The token itself stays valid until it
/// expires; there is no server-side revocation.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar
        .remove(credential_removal(&state.config))
        .remove(state_removal());

    (jar, Json(serde_json::json!({ "message": "Logged out" })))
}

// =============================================================================
// Helpers
// =============================================================================

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(state: Option<&str>, jar: &CookieJar) -> Result<(), AppError> {
    let expected = jar.get(STATE_COOKIE).map(|cookie| cookie.value());
    match (state, expected) {
        (Some(received), Some(expected)) if !expected.is_empty() && received == expected => {
            Ok(())
        }
        _ => Err(AppError::InvalidState),
    }
}
