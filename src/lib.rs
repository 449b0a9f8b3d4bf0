//! Thandal - a personal ledger backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - OAuth login (Google, GitHub) and logout                  │
//! │  - Session gate on /me and /transactions                    │
//! │  - Metrics                                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Identity linking (provider id, then email)               │
//! │  - Stateless signed credentials                             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx): users, transactions                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: JSON handlers for `/me` and `/transactions`
//! - `auth`: OAuth flow, credential tokens, session gate
//! - `service`: Identity linking
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `metrics`: Prometheus instruments
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Credential issuer and verifier
    pub tokens: Arc<auth::TokenIssuer>,

    /// Authorization code to profile exchange
    pub profiles: Arc<dyn auth::ProfileExchange>,

    /// Provider profile to local user resolution
    pub identity: Arc<service::IdentityService>,
}

impl AppState {
    /// Initialize application state with the real provider client
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrated
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let profiles = Arc::new(auth::OAuthClient::new(
            config.auth.clone(),
            build_http_client()?,
        ));
        Self::build(config, profiles).await
    }

    /// Initialize application state with a custom profile exchange
    ///
    /// Used by integration tests to stand in for the providers.
    pub async fn with_profile_exchange(
        config: config::AppConfig,
        profiles: Arc<dyn auth::ProfileExchange>,
    ) -> Result<Self, error::AppError> {
        Self::build(config, profiles).await
    }

    async fn build(
        config: config::AppConfig,
        profiles: Arc<dyn auth::ProfileExchange>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = Arc::new(
            data::Database::connect(&config.database.url, config.database.max_connections).await?,
        );
        tracing::info!("Database connected");

        let tokens = Arc::new(auth::TokenIssuer::new(
            &config.auth.token_secret,
            config.auth.token_max_age,
        ));
        let identity = Arc::new(service::IdentityService::new(db.clone()));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            tokens,
            profiles,
            identity,
        })
    }
}

fn build_http_client() -> Result<reqwest::Client, error::AppError> {
    reqwest::Client::builder()
        .user_agent("Thandal/0.1.0")
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| error::AppError::Internal(e.into()))
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.frontend);
    let secure = state.config.should_use_secure_cookies();

    let router = Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::protected_router(state.clone()))
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router());

    with_security_headers(router, secure)
}

/// Hardening headers on every response; HSTS only when served over https
fn with_security_headers(router: axum::Router, secure: bool) -> axum::Router {
    use axum::http::{HeaderValue, header};
    use tower_http::set_header::SetResponseHeaderLayer;

    let router = router
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ));

    if secure {
        router.layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=15552000; includeSubDomains"),
        ))
    } else {
        router
    }
}

fn build_cors_layer(frontend: &config::FrontendConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method, header};
    use tower_http::cors::CorsLayer;

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let origin = frontend.origin.trim_end_matches('/');
    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin([origin]),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %origin,
                "Failed to parse frontend origin; denying cross-origin requests"
            );
            layer
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
