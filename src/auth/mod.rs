//! Google and GitHub OAuth authentication
//!
//! Handles:
//! - Provider consent redirects and callbacks
//! - Stateless signed credentials
//! - The session gate in front of protected routes

mod middleware;
mod oauth;
mod provider;
pub mod token;

pub use middleware::{CurrentUser, authenticate, require_auth};
pub use oauth::{auth_router, complete_login, credential_cookie};
pub use provider::{OAuthClient, Profile, ProfileExchange, Provider};
pub use token::{Claims, TokenError, TokenIssuer};

/// Cookie carrying the credential
pub const TOKEN_COOKIE: &str = "token";

/// Cookie carrying the OAuth CSRF state between initiate and callback
pub const STATE_COOKIE: &str = "oauth_state";
