//! Error types for Thandal
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Authentication failures never carry the reason a credential was
/// rejected; callers only learn that it was.
#[derive(Debug, Error)]
pub enum AppError {
    /// No credential presented (401)
    #[error("Authentication required")]
    Unauthenticated,

    /// Credential malformed, expired or wrongly signed (401)
    #[error("Invalid or expired credential")]
    InvalidToken,

    /// Consent denied or code exchange failed (502)
    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailure(String),

    /// Uniqueness violation while creating or merging a user (409)
    #[error("Identity conflict: {0}")]
    IdentityConflict(String),

    /// OAuth state parameter did not match the state cookie (400)
    #[error("OAuth state mismatch")]
    InvalidState,

    /// Provider credentials absent from configuration (503)
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// Resource not found or not owned by the caller (404)
    #[error("Resource not found")]
    NotFound,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider network failure (502)
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

impl AppError {
    /// Short machine-readable label, used for metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::InvalidToken => "invalid_token",
            AppError::ProviderAuthFailure(_) => "provider_auth_failure",
            AppError::IdentityConflict(_) => "identity_conflict",
            AppError::InvalidState => "invalid_state",
            AppError::ProviderNotConfigured(_) => "provider_not_configured",
            AppError::NotFound => "not_found",
            AppError::Validation(_) => "validation",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Database(_) => "database",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Non-sensitive code carried by the login redirect after a failed
    /// OAuth callback. Provider messages are never forwarded.
    pub fn login_error_code(&self) -> &'static str {
        match self {
            AppError::ProviderAuthFailure(_) | AppError::UpstreamUnavailable(_) => {
                "provider_auth_failed"
            }
            AppError::IdentityConflict(_) => "identity_conflict",
            AppError::InvalidState => "invalid_state",
            AppError::ProviderNotConfigured(_) => "provider_not_configured",
            _ => "server_error",
        }
    }

    /// Map a store error, turning unique-constraint violations into
    /// `IdentityConflict`.
    pub fn from_user_write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::IdentityConflict(db_err.message().to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message) = match &self {
            AppError::Unauthenticated | AppError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::ProviderAuthFailure(_) => (
                StatusCode::BAD_GATEWAY,
                "Provider authentication failed".to_string(),
            ),
            AppError::IdentityConflict(_) => (
                StatusCode::CONFLICT,
                "Account already linked elsewhere".to_string(),
            ),
            AppError::InvalidState => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::ProviderNotConfigured(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UpstreamUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                "Upstream service unavailable".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.error_type()])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_codes_never_leak_provider_messages() {
        let error = AppError::ProviderAuthFailure("bad_verification_code: secret detail".into());
        assert_eq!(error.login_error_code(), "provider_auth_failed");

        let error = AppError::IdentityConflict("UNIQUE constraint failed: users.email".into());
        assert_eq!(error.login_error_code(), "identity_conflict");

        assert_eq!(AppError::NotFound.login_error_code(), "server_error");
    }

    #[test]
    fn unauthenticated_and_invalid_token_share_status() {
        let missing = AppError::Unauthenticated.into_response();
        let invalid = AppError::InvalidToken.into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
    }
}
