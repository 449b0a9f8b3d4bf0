//! SQLite database operations
//!
//! All database access goes through this module.
//! Every transaction query is scoped by its owner's user id.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use super::models::*;
use crate::auth::Provider;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `url` - SQLite connection string (e.g. "sqlite://thandal.db")
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Get a user by internal id
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Find the user linked to an external provider id
    pub async fn find_user_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let sql = match provider {
            Provider::Google => "SELECT * FROM users WHERE google_id = ?",
            Provider::Github => "SELECT * FROM users WHERE github_id = ?",
        };

        let user = sqlx::query_as::<_, User>(sql)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Find a user by (normalized) email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Insert a new user
    ///
    /// # Errors
    /// `IdentityConflict` when the email or a provider id is already taken
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, user_name, email, google_id, github_id, provider, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(&user.google_id)
        .bind(&user.github_id)
        .bind(user.provider)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from_user_write)?;

        Ok(())
    }

    /// Attach a provider id to an existing user and make that provider
    /// the provider-of-record, in a single statement.
    ///
    /// # Returns
    /// The updated user, or `NotFound` if the user vanished
    pub async fn link_provider(
        &self,
        user_id: &str,
        provider: Provider,
        provider_id: &str,
    ) -> Result<User, AppError> {
        let sql = match provider {
            Provider::Google => {
                "UPDATE users SET google_id = ?, provider = ?, updated_at = ? WHERE id = ?"
            }
            Provider::Github => {
                "UPDATE users SET github_id = ?, provider = ?, updated_at = ? WHERE id = ?"
            }
        };

        let result = sqlx::query(sql)
            .bind(provider_id)
            .bind(provider)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_user_write)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        self.get_user(user_id).await?.ok_or(AppError::NotFound)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Insert a transaction
    pub async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, taken_amnt, cltn_amnt, datee, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.user_id)
        .bind(transaction.taken_amnt)
        .bind(transaction.cltn_amnt)
        .bind(transaction.datee)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List an owner's transactions, newest date first
    ///
    /// # Arguments
    /// * `user_id` - Owner
    /// * `date` - Only entries on this date, when given
    pub async fn list_transactions(
        &self,
        user_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = ? AND (? IS NULL OR datee = ?)
            ORDER BY datee DESC, created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Delete one transaction, only if `user_id` owns it
    ///
    /// # Returns
    /// `true` if a row was deleted
    pub async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
