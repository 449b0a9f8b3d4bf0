//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Provider;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// One authenticated human
///
/// At least one of `google_id` / `github_id` is always set; the store
/// enforces uniqueness of email and of each provider id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    /// Provider used for the most recent account link
    pub provider: Provider,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Transaction
// =============================================================================

/// A single ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    /// Owner; never taken from request input
    pub user_id: String,
    /// Amount taken out
    pub taken_amnt: f64,
    /// Amount collected
    pub cltn_amnt: f64,
    pub datee: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Collected minus taken
    pub fn remain(&self) -> f64 {
        self.cltn_amnt - self.taken_amnt
    }
}
