//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

use crate::auth::Provider;
use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub frontend: FrontendConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 5000)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string, e.g. "sqlite://thandal.db"
    pub url: String,
    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Token signing secret (32+ bytes)
    pub token_secret: String,
    /// Token lifetime in seconds (default: 86400 = 1 day)
    pub token_max_age: i64,
    /// Public base URL of this service, used for OAuth redirect URIs
    pub callback_base_url: String,
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
}

impl AuthConfig {
    /// Credentials for a provider, if configured
    pub fn client(&self, provider: Provider) -> Option<&OAuthClientConfig> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Github => self.github.as_ref(),
        }
    }

    /// Redirect URI registered with the provider
    pub fn redirect_uri(&self, provider: Provider) -> String {
        format!(
            "{}/auth/{}/callback",
            self.callback_base_url.trim_end_matches('/'),
            provider.as_str()
        )
    }
}

/// OAuth client credentials for one provider
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Browser application the flow redirects into
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// Allowed CORS origin, e.g. "https://thandal.onrender.com"
    pub origin: String,
    /// Route shown after a successful login
    pub landing_path: String,
    /// Login route, receives `?error=<code>` on failure
    pub login_path: String,
}

impl FrontendConfig {
    pub fn landing_url(&self) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), self.landing_path)
    }

    pub fn login_error_url(&self, code: &str) -> String {
        format!(
            "{}{}?error={}",
            self.origin.trim_end_matches('/'),
            self.login_path,
            code
        )
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (THANDAL__*), then `PORT`
    ///
    /// # Errors
    /// Returns error if configuration is missing or invalid. The signing
    /// secret and the database URL have no defaults.
    pub fn load() -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("database.max_connections", 5)?
            .set_default("auth.token_max_age", 86400)?
            .set_default("auth.callback_base_url", "http://localhost:5000")?
            .set_default("frontend.origin", "http://localhost:5173")?
            .set_default("frontend.landing_path", "/transactions")?
            .set_default("frontend.login_path", "/login")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("THANDAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Whether the credential cookie is sent as `Secure; SameSite=None`
    pub fn should_use_secure_cookies(&self) -> bool {
        let url = self.auth.callback_base_url.trim();
        url.to_ascii_lowercase().starts_with("https://") || !is_local_url(url)
    }

    pub(crate) fn validate(&self) -> Result<(), AppError> {
        const MIN_TOKEN_SECRET_BYTES: usize = 32;

        if self.auth.token_secret.trim().is_empty() {
            return Err(AppError::Config("auth.token_secret is required".to_string()));
        }

        if self.auth.token_secret.len() < MIN_TOKEN_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "auth.token_secret must be at least {} bytes",
                MIN_TOKEN_SECRET_BYTES
            )));
        }

        if self.auth.token_max_age <= 0 {
            return Err(AppError::Config(
                "auth.token_max_age must be greater than 0".to_string(),
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(AppError::Config("database.url is required".to_string()));
        }

        let callback_base = self.auth.callback_base_url.trim();
        if url::Url::parse(callback_base).is_err() {
            return Err(AppError::Config(format!(
                "auth.callback_base_url is not a valid URL: {callback_base}"
            )));
        }

        if self.should_use_secure_cookies()
            && !callback_base.to_ascii_lowercase().starts_with("https://")
        {
            return Err(AppError::Config(
                "auth.callback_base_url must be https for non-local hosts".to_string(),
            ));
        }

        Ok(())
    }

    /// Log non-fatal configuration issues
    ///
    /// Called once tracing is up, since the subscriber itself is
    /// configured from `logging`.
    pub fn log_warnings(&self) {
        if !self.should_use_secure_cookies() {
            tracing::warn!(
                callback_base_url = %self.auth.callback_base_url,
                "Using insecure credential cookies for local development"
            );
        }

        for provider in Provider::ALL {
            if self.auth.client(provider).is_none() {
                tracing::warn!(provider = provider.as_str(), "OAuth provider not configured");
            }
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub fn default_filter(&self) -> String {
        format!("thandal={},tower_http=debug", self.level.trim())
    }

    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

fn is_local_url(raw: &str) -> bool {
    let Some(host) = url::Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_ascii_lowercase()))
    else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            database: DatabaseConfig {
                url: "sqlite://thandal-test.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                token_secret: "x".repeat(32),
                token_max_age: 86_400,
                callback_base_url: "http://localhost:5000".to_string(),
                google: Some(OAuthClientConfig {
                    client_id: "google-client-id".to_string(),
                    client_secret: "google-client-secret".to_string(),
                }),
                github: None,
            },
            frontend: FrontendConfig {
                origin: "http://localhost:5173".to_string(),
                landing_path: "/transactions".to_string(),
                login_path: "/login".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_missing_token_secret() {
        let mut config = valid_config();
        config.auth.token_secret = String::new();

        let error = config.validate().expect_err("empty secret must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("auth.token_secret is required")
        ));
    }

    #[test]
    fn validate_rejects_short_token_secret() {
        let mut config = valid_config();
        config.auth.token_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("token secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("at least 32 bytes")
        ));
    }

    #[test]
    fn validate_rejects_missing_database_url() {
        let mut config = valid_config();
        config.database.url = "  ".to_string();

        assert!(matches!(
            config.validate(),
            Err(AppError::Config(message)) if message.contains("database.url")
        ));
    }

    #[test]
    fn validate_rejects_http_for_public_host() {
        let mut config = valid_config();
        config.auth.callback_base_url = "http://ledger.example.com".to_string();

        let error = config
            .validate()
            .expect_err("public hosts must require https");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("must be https")
        ));
    }

    #[test]
    fn https_callback_uses_secure_cookies() {
        let mut config = valid_config();
        config.auth.callback_base_url = "https://api.example.com".to_string();
        assert!(config.validate().is_ok());
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn redirect_and_frontend_urls() {
        let mut config = valid_config();
        config.auth.callback_base_url = "https://api.example.com/".to_string();
        assert_eq!(
            config.auth.redirect_uri(Provider::Github),
            "https://api.example.com/auth/github/callback"
        );
        assert_eq!(
            config.frontend.login_error_url("invalid_state"),
            "http://localhost:5173/login?error=invalid_state"
        );
        assert_eq!(
            config.frontend.landing_url(),
            "http://localhost:5173/transactions"
        );
    }

    #[test]
    fn logging_section_drives_subscriber_settings() {
        let mut config = valid_config();
        assert!(!config.logging.is_json());
        assert_eq!(config.logging.default_filter(), "thandal=info,tower_http=debug");

        config.logging.format = "JSON".to_string();
        config.logging.level = "debug".to_string();
        assert!(config.logging.is_json());
        assert_eq!(config.logging.default_filter(), "thandal=debug,tower_http=debug");
    }
}
