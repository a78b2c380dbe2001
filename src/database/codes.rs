// ABOUTME: Single-use authorization code store with atomic consumption
// ABOUTME: Enforces exactly-once exchange via a conditional UPDATE in the database

use super::Database;
use crate::oauth2_server::models::OAuth2AuthCode;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the authorization code table
    pub(super) async fn migrate_codes(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_auth_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT,
                issued_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL,
                used BOOLEAN NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_auth_codes_expiry ON oauth2_auth_codes(expires_at)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Store a freshly minted authorization code
    ///
    /// # Errors
    ///
    /// Returns an error on code collision (primary key conflict) - callers
    /// treat that as an internal error and re-generate.
    pub async fn store_oauth2_auth_code(&self, auth_code: &OAuth2AuthCode) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_auth_codes (
                code, client_id, user_id, redirect_uri, scope,
                issued_at, expires_at, used
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(&auth_code.code)
        .bind(&auth_code.client_id)
        .bind(auth_code.user_id.to_string())
        .bind(&auth_code.redirect_uri)
        .bind(&auth_code.scope)
        .bind(auth_code.issued_at)
        .bind(auth_code.expires_at)
        .bind(auth_code.used)
        .execute(self.pool())
        .await
        .map_err(|e| anyhow!("Failed to store authorization code: {e}"))?;

        Ok(())
    }

    /// Atomically consume an authorization code
    ///
    /// A single conditional UPDATE verifies the binding (`client_id`,
    /// `redirect_uri`), expiry, and single-use flag, and flips `used` in the
    /// same statement. Two racing callers see exactly one `Some`.
    ///
    /// Returns `None` when the code is unknown, already used, expired, or
    /// bound to different client credentials - callers must not distinguish.
    ///
    /// # Errors
    ///
    /// Returns an error only on store failure, never on validation failure.
    pub async fn consume_auth_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuth2AuthCode>> {
        let row = sqlx::query(
            r"
            UPDATE oauth2_auth_codes
            SET used = 1
            WHERE code = $1
              AND client_id = $2
              AND redirect_uri = $3
              AND used = 0
              AND expires_at > $4
            RETURNING code, client_id, user_id, redirect_uri, scope,
                      issued_at, expires_at, used
            ",
        )
        .bind(code)
        .bind(client_id)
        .bind(redirect_uri)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_auth_code).transpose()
    }

    /// Fetch a code without consuming it (diagnostics and tests)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub async fn get_oauth2_auth_code(&self, code: &str) -> Result<Option<OAuth2AuthCode>> {
        let row = sqlx::query(
            r"
            SELECT code, client_id, user_id, redirect_uri, scope,
                   issued_at, expires_at, used
            FROM oauth2_auth_codes WHERE code = $1
            ",
        )
        .bind(code)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_auth_code).transpose()
    }

    /// Delete expired codes, consumed or not
    ///
    /// Expiry remains enforced lazily inside [`Self::consume_auth_code`];
    /// this sweep only reclaims storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM oauth2_auth_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}

/// Convert a database row into an [`OAuth2AuthCode`]
fn row_to_auth_code(row: sqlx::sqlite::SqliteRow) -> Result<OAuth2AuthCode> {
    let user_id: String = row.try_get("user_id")?;

    Ok(OAuth2AuthCode {
        code: row.try_get("code")?,
        client_id: row.try_get("client_id")?,
        user_id: Uuid::parse_str(&user_id)?,
        redirect_uri: row.try_get("redirect_uri")?,
        scope: row.try_get("scope")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
    })
}
