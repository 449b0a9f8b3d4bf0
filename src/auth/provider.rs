//! External identity providers
//!
//! Builds consent URLs and exchanges authorization codes for profiles.
//! The rest of the crate only sees [`Profile`]; how a provider is
//! spoken to stays behind [`ProfileExchange`].

use axum::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::AuthConfig;
use crate::error::AppError;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

/// Supported OAuth providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }

    /// Scope requested on the consent screen
    pub fn scope(&self) -> &'static str {
        match self {
            Provider::Google => "profile email",
            Provider::Github => "user:email",
        }
    }

    fn authorize_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => GOOGLE_AUTHORIZE_URL,
            Provider::Github => GITHUB_AUTHORIZE_URL,
        }
    }

    /// Consent screen URL the browser is redirected to
    pub fn authorization_url(&self, client_id: &str, redirect_uri: &str, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", self.scope())
            .append_pair("state", state)
            .finish();
        format!("{}?{}", self.authorize_endpoint(), query)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(AppError::Validation(format!("unknown provider: {other}"))),
        }
    }
}

/// Profile returned by a provider after a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub provider: Provider,
    pub provider_id: String,
    pub display_name: String,
    /// Normalized (trimmed, lower-cased) email, if the provider shared one
    pub email: Option<String>,
}

impl Profile {
    pub fn new(
        provider: Provider,
        provider_id: impl Into<String>,
        display_name: impl Into<String>,
        email: Option<&str>,
    ) -> Self {
        Self {
            provider,
            provider_id: provider_id.into(),
            display_name: display_name.into(),
            email: email.and_then(normalize_email),
        }
    }

    /// Stand-in stored when the provider withheld the email address.
    /// Never used for account matching.
    pub fn placeholder_email(&self) -> String {
        format!(
            "{}-{}@users.noreply.thandal.local",
            self.provider.as_str(),
            self.provider_id
        )
    }
}

fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        None
    } else {
        Some(email)
    }
}

/// Turns an authorization code into a provider profile.
#[async_trait]
pub trait ProfileExchange: Send + Sync {
    async fn exchange_code_for_profile(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<Profile, AppError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn google_profile(info: GoogleUserInfo) -> Profile {
    let email = match info.email_verified {
        Some(false) => None,
        _ => info.email.as_deref(),
    };
    let name = info.name.unwrap_or_else(|| info.sub.clone());
    Profile::new(Provider::Google, info.sub, name, email)
}

fn github_profile(user: GitHubUser, emails: &[GitHubEmail]) -> Profile {
    let email = user.email.clone().or_else(|| {
        emails
            .iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email.clone())
    });
    let name = user
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(user.login);
    Profile::new(Provider::Github, user.id.to_string(), name, email.as_deref())
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// Provider client backed by `reqwest`
pub struct OAuthClient {
    config: AuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: AuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    async fn exchange_code(&self, provider: Provider, code: &str) -> Result<String, AppError> {
        let client = self
            .config
            .client(provider)
            .ok_or_else(|| AppError::ProviderNotConfigured(provider.to_string()))?;
        let redirect_uri = self.config.redirect_uri(provider);
        let endpoint = match provider {
            Provider::Google => GOOGLE_TOKEN_URL,
            Provider::Github => GITHUB_TOKEN_URL,
        };

        let response = self
            .http
            .post(endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: TokenResponse = response.json().await.map_err(|e| {
            AppError::ProviderAuthFailure(format!("unreadable token response: {e}"))
        })?;

        match body.access_token {
            Some(token) if status.is_success() => Ok(token),
            _ => Err(AppError::ProviderAuthFailure(format!(
                "token exchange rejected (status {status}, error {})",
                body.error.as_deref().unwrap_or("none")
            ))),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ProviderAuthFailure(format!(
                "profile request to {url} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ProviderAuthFailure(format!("unreadable profile: {e}")))
    }
}

#[async_trait]
impl ProfileExchange for OAuthClient {
    async fn exchange_code_for_profile(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<Profile, AppError> {
        let access_token = self.exchange_code(provider, code).await?;

        let profile = match provider {
            Provider::Google => {
                let info: GoogleUserInfo =
                    self.fetch_json(GOOGLE_USERINFO_URL, &access_token).await?;
                google_profile(info)
            }
            Provider::Github => {
                let user: GitHubUser = self.fetch_json(GITHUB_USER_URL, &access_token).await?;
                let emails = if user.email.is_none() {
                    // user:email scope grants this even when the public email is hidden
                    match self
                        .fetch_json::<Vec<GitHubEmail>>(GITHUB_EMAILS_URL, &access_token)
                        .await
                    {
                        Ok(emails) => emails,
                        Err(error) => {
                            tracing::warn!(%error, "Could not list GitHub emails");
                            Vec::new()
                        }
                    }
                } else {
                    Vec::new()
                };
                github_profile(user, &emails)
            }
        };

        tracing::debug!(
            provider = %provider,
            provider_id = %profile.provider_id,
            has_email = profile.email.is_some(),
            "Provider profile resolved"
        );

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert!("twitter".parse::<Provider>().is_err());
    }

    #[test]
    fn google_authorization_url_requests_profile_and_email() {
        let url = Provider::Google.authorization_url(
            "client-1",
            "https://api.example.com/auth/google/callback",
            "state-xyz",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("scope=profile+email"));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fapi.example.com%2Fauth%2Fgoogle%2Fcallback"
        ));
    }

    #[test]
    fn github_authorization_url_requests_user_email() {
        let url = Provider::Github.authorization_url("gh", "http://localhost/cb", "s");
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("scope=user%3Aemail"));
    }

    #[test]
    fn profile_normalizes_email() {
        let profile = Profile::new(Provider::Google, "g-1", "Ann", Some("  Ann@X.com "));
        assert_eq!(profile.email.as_deref(), Some("ann@x.com"));

        let profile = Profile::new(Provider::Google, "g-1", "Ann", Some("   "));
        assert_eq!(profile.email, None);
    }

    #[test]
    fn placeholder_email_is_unique_per_provider_identity() {
        let github = Profile::new(Provider::Github, "42", "octo", None);
        let google = Profile::new(Provider::Google, "42", "octo", None);
        assert_eq!(
            github.placeholder_email(),
            "github-42@users.noreply.thandal.local"
        );
        assert_ne!(github.placeholder_email(), google.placeholder_email());
    }

    #[test]
    fn google_profile_drops_unverified_email() {
        let info: GoogleUserInfo = serde_json::from_value(serde_json::json!({
            "sub": "1089",
            "name": "Ann",
            "email": "ann@x.com",
            "email_verified": false
        }))
        .unwrap();
        let profile = google_profile(info);
        assert_eq!(profile.provider_id, "1089");
        assert_eq!(profile.email, None);
    }

    #[test]
    fn github_profile_falls_back_to_primary_verified_email_and_login() {
        let user: GitHubUser = serde_json::from_value(serde_json::json!({
            "id": 583231,
            "login": "octocat",
            "name": null,
            "email": null
        }))
        .unwrap();
        let emails: Vec<GitHubEmail> = serde_json::from_value(serde_json::json!([
            {"email": "old@x.com", "primary": false, "verified": true},
            {"email": "Octo@X.com", "primary": true, "verified": true}
        ]))
        .unwrap();

        let profile = github_profile(user, &emails);
        assert_eq!(profile.provider_id, "583231");
        assert_eq!(profile.display_name, "octocat");
        assert_eq!(profile.email.as_deref(), Some("octo@x.com"));
    }

    #[test]
    fn github_profile_without_any_email() {
        let user: GitHubUser = serde_json::from_value(serde_json::json!({
            "id": 7,
            "login": "ghost",
            "name": "Ghost",
            "email": null
        }))
        .unwrap();
        let profile = github_profile(user, &[]);
        assert_eq!(profile.display_name, "Ghost");
        assert_eq!(profile.email, None);
    }
}
