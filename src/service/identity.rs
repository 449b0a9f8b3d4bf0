//! Identity linking
//!
//! Maps an external provider profile to a local user, creating the user
//! on first login and merging a second provider into an existing account
//! that shares the same email.

use chrono::Utc;
use std::sync::Arc;

use crate::auth::{Profile, Provider};
use crate::data::{Database, EntityId, User};
use crate::error::AppError;
use crate::metrics::{ACCOUNT_MERGES_TOTAL, USERS_CREATED_TOTAL};

/// Mask an email for logs: "a***@x.com"
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        _ => "***@***".to_string(),
    }
}

/// Identity service
pub struct IdentityService {
    db: Arc<Database>,
}

impl IdentityService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Resolve `profile` to a local user
    ///
    /// 1. Match by (provider, provider id): returned untouched, no write.
    /// 2. Otherwise, with an email, match by email: the provider id is
    ///    attached and the provider becomes provider-of-record.
    /// 3. Otherwise create a new user. Without an email a placeholder is
    ///    stored, so the same human on two providers without emails ends up
    ///    as two accounts.
    ///
    /// At most one write happens per call.
    ///
    /// # Errors
    /// `IdentityConflict` if a concurrent login claimed the same email or
    /// provider id first. Store failures propagate unchanged.
    pub async fn link_profile(&self, profile: &Profile) -> Result<User, AppError> {
        let provider = profile.provider;

        if let Some(user) = self
            .db
            .find_user_by_provider_id(provider, &profile.provider_id)
            .await?
        {
            tracing::debug!(
                user_id = %user.id,
                provider = %provider,
                "Existing user matched by provider id"
            );
            return Ok(user);
        }

        if let Some(email) = profile.email.as_deref() {
            if let Some(existing) = self.db.find_user_by_email(email).await? {
                let user = self
                    .db
                    .link_provider(&existing.id, provider, &profile.provider_id)
                    .await?;
                ACCOUNT_MERGES_TOTAL.inc();
                tracing::info!(
                    user_id = %user.id,
                    email = %mask_email(email),
                    provider = %provider,
                    "Linked provider to existing account by email"
                );
                return Ok(user);
            }
        }

        let now = Utc::now();
        let email = profile
            .email
            .clone()
            .unwrap_or_else(|| profile.placeholder_email());
        let mut user = User {
            id: EntityId::new().0,
            user_name: Some(profile.display_name.clone()),
            email: Some(email),
            google_id: None,
            github_id: None,
            provider,
            created_at: now,
            updated_at: now,
        };
        match provider {
            Provider::Google => user.google_id = Some(profile.provider_id.clone()),
            Provider::Github => user.github_id = Some(profile.provider_id.clone()),
        }

        self.db.insert_user(&user).await?;
        USERS_CREATED_TOTAL
            .with_label_values(&[provider.as_str()])
            .inc();

        tracing::info!(
            user_id = %user.id,
            email = %user.email.as_deref().map(mask_email).unwrap_or_default(),
            provider = %provider,
            "User created"
        );

        Ok(user)
    }
}
