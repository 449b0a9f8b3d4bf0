//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use thandal::auth::{Profile, ProfileExchange, Provider};
use thandal::data::{EntityId, User};
use thandal::error::AppError;
use thandal::{AppState, config};
use tokio::net::TcpListener;

pub const FRONTEND_ORIGIN: &str = "http://localhost:5173";
pub const TOKEN_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// Stands in for Google and GitHub: authorization codes map to profiles
#[derive(Default)]
pub struct FakeProfileExchange {
    profiles: HashMap<String, Profile>,
}

impl FakeProfileExchange {
    pub fn with(mut self, code: &str, profile: Profile) -> Self {
        self.profiles.insert(code.to_string(), profile);
        self
    }
}

#[async_trait]
impl ProfileExchange for FakeProfileExchange {
    async fn exchange_code_for_profile(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<Profile, AppError> {
        self.profiles
            .get(code)
            .filter(|profile| profile.provider == provider)
            .cloned()
            .ok_or_else(|| AppError::ProviderAuthFailure(format!("unknown code {code}")))
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

pub fn test_config(db_url: String) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: config::DatabaseConfig {
            url: db_url,
            max_connections: 5,
        },
        auth: config::AuthConfig {
            token_secret: TOKEN_SECRET.to_string(),
            token_max_age: 86400,
            callback_base_url: "http://localhost:5000".to_string(),
            google: Some(config::OAuthClientConfig {
                client_id: "google-client-id".to_string(),
                client_secret: "google-client-secret".to_string(),
            }),
            github: Some(config::OAuthClientConfig {
                client_id: "github-client-id".to_string(),
                client_secret: "github-client-secret".to_string(),
            }),
        },
        frontend: config::FrontendConfig {
            origin: FRONTEND_ORIGIN.to_string(),
            landing_path: "/transactions".to_string(),
            login_path: "/login".to_string(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestServer {
    /// Create a new test server with no known authorization codes
    pub async fn new() -> Self {
        Self::with_exchange(FakeProfileExchange::default()).await
    }

    /// Create a new test server backed by `exchange`
    pub async fn with_exchange(exchange: FakeProfileExchange) -> Self {
        Self::with_config(exchange, |_| {}).await
    }

    /// Create a new test server, adjusting the config first
    pub async fn with_config(
        exchange: FakeProfileExchange,
        adjust: impl FnOnce(&mut config::AppConfig),
    ) -> Self {
        thandal::metrics::init_metrics();

        let temp_dir = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}", temp_dir.path().join("test.db").display());
        let mut config = test_config(db_url);
        adjust(&mut config);

        let state = AppState::with_profile_exchange(config, Arc::new(exchange))
            .await
            .unwrap();

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = thandal::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Insert a Google user directly into the database
    pub async fn create_test_user(&self, google_id: &str, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            user_name: Some("Test User".to_string()),
            email: Some(email.to_string()),
            google_id: Some(google_id.to_string()),
            github_id: None,
            provider: Provider::Google,
            created_at: now,
            updated_at: now,
        };
        self.state.db.insert_user(&user).await.unwrap();
        user
    }

    /// Signed credential for `user`
    pub fn create_test_token(&self, user: &User) -> String {
        self.state.tokens.issue(user).unwrap()
    }

    /// `Cookie` header value carrying a credential for `user`
    pub fn auth_cookie(&self, user: &User) -> String {
        format!("token={}", self.create_test_token(user))
    }
}

/// Value of the cookie `name` set by `response`, if any
pub fn set_cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            let pair = value.split(';').next()?;
            let (key, val) = pair.split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
}

/// Full `Set-Cookie` header for the cookie `name`
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}
