// ABOUTME: Mail-account projection database operations
// ABOUTME: Read-mostly store backing the userinfo endpoint's identity claims

use super::Database;
use crate::models::User;
use anyhow::{anyhow, Result};
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the users table
    pub(super) async fn migrate_users(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                email_verified BOOLEAN NOT NULL DEFAULT 0,
                display_name TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Insert a user projection
    ///
    /// Account management owns user records; this path exists for operator
    /// seeding and tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is already in use or the insert fails.
    pub async fn create_user(&self, user: &User) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, email_verified, display_name, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| anyhow!("Failed to insert user {}: {e}", user.email))?;

        Ok(user.id)
    }

    /// Get a user by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            r"
            SELECT id, email, email_verified, display_name, is_active, created_at
            FROM users WHERE id = $1
            ",
        )
        .bind(user_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_user).transpose()
    }

    /// Get a user by email
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r"
            SELECT id, email, email_verified, display_name, is_active, created_at
            FROM users WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_user).transpose()
    }
}

/// Convert a database row into a [`User`]
fn row_to_user(row: sqlx::sqlite::SqliteRow) -> Result<User> {
    let id: String = row.try_get("id")?;

    Ok(User {
        id: Uuid::parse_str(&id)?,
        email: row.try_get("email")?,
        email_verified: row.try_get("email_verified")?,
        display_name: row.try_get("display_name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}
