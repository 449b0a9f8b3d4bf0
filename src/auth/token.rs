//! Credential issuing and verification
//!
//! Uses HMAC-signed tokens carried in a cookie.
//! No server-side session storage: validity is signature plus expiry.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::Provider;
use crate::data::User;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Identity claims encoded in a credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Internal user id
    pub id: String,
    pub email: Option<String>,
    pub provider: Provider,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

impl Claims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Why a credential was rejected
///
/// Callers outside this module treat every variant the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

/// Mints and checks credentials with the process-wide secret
///
/// Token format: base64(claims_json).base64(hmac_sha256(base64(claims_json)))
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// # Arguments
    /// * `secret` - HMAC secret key
    /// * `ttl_seconds` - Credential lifetime
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid HMAC key: {e}")))
    }

    /// Issue a credential for `user`, expiring one TTL from now
    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            id: user.id.clone(),
            email: user.email.clone(),
            provider: user.provider,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims
    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        let payload = serde_json::to_vec(claims).map_err(|e| AppError::Internal(e.into()))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload_b64, signature_b64))
    }

    /// Verify a credential against the current time
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a credential
    ///
    /// Expiry is checked before the signature, so a token past its
    /// expiry reports `Expired` whatever its signature.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(TokenError::Malformed)?;
        if payload_b64.is_empty() || signature_b64.contains('.') {
            return Err(TokenError::Malformed);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        let mut mac = self.mac().map_err(|_| TokenError::InvalidSignature)?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-32-bytes-long!!!";

    fn user() -> User {
        let now = Utc::now();
        User {
            id: "01HZX0000000000000000000AA".to_string(),
            user_name: Some("Ann".to_string()),
            email: Some("ann@x.com".to_string()),
            google_id: Some("g-1".to_string()),
            github_id: None,
            provider: Provider::Google,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let issuer = TokenIssuer::new(SECRET, 86_400);
        let user = user();
        let token = issuer.issue(&user).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.id, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.provider, Provider::Google);
        assert_eq!(claims.exp - claims.iat, 86_400);
    }

    #[test]
    fn token_expires_after_ttl() {
        let issuer = TokenIssuer::new(SECRET, 86_400);
        let issued_at = Utc::now();
        let token = issuer.issue_at(&user(), issued_at).unwrap();

        assert!(issuer
            .verify_at(&token, issued_at + Duration::hours(23))
            .is_ok());
        assert_eq!(
            issuer.verify_at(&token, issued_at + Duration::hours(24)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn expired_token_reports_expired_even_with_bad_signature() {
        let issuer = TokenIssuer::new(SECRET, 60);
        let other = TokenIssuer::new("another-secret-key-32-bytes-long", 60);
        let issued_at = Utc::now() - Duration::hours(2);
        let token = other.issue_at(&user(), issued_at).unwrap();

        assert_eq!(issuer.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let issuer = TokenIssuer::new(SECRET, 86_400);
        let other = TokenIssuer::new("another-secret-key-32-bytes-long", 86_400);
        let token = other.issue(&user()).unwrap();

        assert_eq!(issuer.verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn tampered_claims_are_invalid_signature() {
        let issuer = TokenIssuer::new(SECRET, 86_400);
        let token = issuer.issue(&user()).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let mut forged: Claims = issuer.verify(&token).unwrap();
        forged.id = "someone-else".to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        assert_eq!(
            issuer.verify(&format!("{forged_payload}.{signature}")),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let issuer = TokenIssuer::new(SECRET, 86_400);
        for token in ["", "no-dot", ".sig", "a.b.c", "!!!.???", "e30.AAAA"] {
            assert_eq!(
                issuer.verify(token),
                Err(TokenError::Malformed),
                "token {token:?}"
            );
        }
    }
}
