//! API request and response DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Provider;
use crate::data::{Transaction, User};
use crate::error::AppError;

/// Current user profile returned by `/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    pub provider: Provider,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_name: user.user_name,
            email: user.email,
            google_id: user.google_id,
            github_id: user.github_id,
            provider: user.provider,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Ledger entry as seen by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: String,
    pub user_id: String,
    pub taken_amnt: f64,
    pub cltn_amnt: f64,
    pub datee: NaiveDate,
    pub created_at: DateTime<Utc>,
    /// cltnAmnt - takenAmnt
    pub remain: f64,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        let remain = transaction.remain();
        Self {
            id: transaction.id,
            user_id: transaction.user_id,
            taken_amnt: transaction.taken_amnt,
            cltn_amnt: transaction.cltn_amnt,
            datee: transaction.datee,
            created_at: transaction.created_at,
            remain,
        }
    }
}

/// Amount sent by the form: a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn value(&self, field: &str) -> Result<f64, AppError> {
        let value = match self {
            Amount::Number(n) => *n,
            Amount::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| AppError::Validation(format!("{field} must be a number")))?,
        };
        if !value.is_finite() {
            return Err(AppError::Validation(format!("{field} must be finite")));
        }
        Ok(value)
    }
}

/// Body of `POST /transactions`
///
/// No owner field: the owner is always the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub taken_amnt: Amount,
    pub cltn_amnt: Amount,
    pub datee: String,
}

/// Validated transaction input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewTransaction {
    pub taken_amnt: f64,
    pub cltn_amnt: f64,
    pub datee: NaiveDate,
}

impl CreateTransactionRequest {
    pub fn validate(&self) -> Result<NewTransaction, AppError> {
        Ok(NewTransaction {
            taken_amnt: self.taken_amnt.value("takenAmnt")?,
            cltn_amnt: self.cltn_amnt.value("cltnAmnt")?,
            datee: parse_date(&self.datee)?,
        })
    }
}

/// Accepts "YYYY-MM-DD" or an RFC 3339 timestamp (date part kept)
pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| AppError::Validation("datee must be a date (YYYY-MM-DD)".to_string()))
}
