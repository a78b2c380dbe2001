// ABOUTME: Access and refresh token store with hashed-at-rest values
// ABOUTME: Reads enforce expiry implicitly; refresh tokens rotate via atomic consumption

use super::Database;
use crate::crypto;
use crate::oauth2_server::models::{OAuth2AccessToken, OAuth2RefreshToken};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the token tables
    pub(super) async fn migrate_tokens(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_access_tokens (
                token_hash TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                scope TEXT,
                issued_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL,
                revoked BOOLEAN NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_refresh_tokens (
                token_hash TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                scope TEXT,
                created_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL,
                revoked BOOLEAN NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_access_tokens_expiry ON oauth2_access_tokens(expires_at)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_refresh_tokens_expiry ON oauth2_refresh_tokens(expires_at)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Store an issued access token record
    ///
    /// # Errors
    ///
    /// Returns an error on digest collision or store failure.
    pub async fn store_access_token(&self, token: &OAuth2AccessToken) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_access_tokens (
                token_hash, client_id, user_id, scope, issued_at, expires_at, revoked
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&token.token_hash)
        .bind(&token.client_id)
        .bind(token.user_id.to_string())
        .bind(&token.scope)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .execute(self.pool())
        .await
        .map_err(|e| anyhow!("Failed to store access token: {e}"))?;

        Ok(())
    }

    /// Look up a live access token by its presented plaintext value
    ///
    /// The presented value is hashed before lookup; expired or revoked
    /// tokens are indistinguishable from absent ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub async fn get_access_token(
        &self,
        presented_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuth2AccessToken>> {
        let digest = crypto::token_digest(presented_token);

        let row = sqlx::query(
            r"
            SELECT token_hash, client_id, user_id, scope, issued_at, expires_at, revoked
            FROM oauth2_access_tokens
            WHERE token_hash = $1 AND revoked = 0 AND expires_at > $2
            ",
        )
        .bind(&digest)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_access_token).transpose()
    }

    /// Revoke an access token presented in plaintext, scoped to one client
    ///
    /// Returns whether a token was actually revoked; revocation endpoints
    /// must not leak that distinction to callers.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn revoke_access_token(&self, presented_token: &str, client_id: &str) -> Result<bool> {
        let digest = crypto::token_digest(presented_token);

        let result = sqlx::query(
            "UPDATE oauth2_access_tokens SET revoked = 1 WHERE token_hash = $1 AND client_id = $2",
        )
        .bind(&digest)
        .bind(client_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store an issued refresh token record
    ///
    /// # Errors
    ///
    /// Returns an error on digest collision or store failure.
    pub async fn store_refresh_token(&self, token: &OAuth2RefreshToken) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_refresh_tokens (
                token_hash, client_id, user_id, scope, created_at, expires_at, revoked
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&token.token_hash)
        .bind(&token.client_id)
        .bind(token.user_id.to_string())
        .bind(&token.scope)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .execute(self.pool())
        .await
        .map_err(|e| anyhow!("Failed to store refresh token: {e}"))?;

        Ok(())
    }

    /// Atomically consume a refresh token for rotation
    ///
    /// Marks the token revoked and returns it in one conditional UPDATE,
    /// mirroring the authorization-code consume semantics: concurrent
    /// rotations of the same token succeed exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error only on store failure, never on validation failure.
    pub async fn consume_refresh_token(
        &self,
        presented_token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuth2RefreshToken>> {
        let digest = crypto::token_digest(presented_token);

        let row = sqlx::query(
            r"
            UPDATE oauth2_refresh_tokens
            SET revoked = 1
            WHERE token_hash = $1
              AND client_id = $2
              AND revoked = 0
              AND expires_at > $3
            RETURNING token_hash, client_id, user_id, scope, created_at, expires_at, revoked
            ",
        )
        .bind(&digest)
        .bind(client_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_refresh_token).transpose()
    }

    /// Revoke a refresh token presented in plaintext, scoped to one client
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn revoke_refresh_token(
        &self,
        presented_token: &str,
        client_id: &str,
    ) -> Result<bool> {
        let digest = crypto::token_digest(presented_token);

        let result = sqlx::query(
            "UPDATE oauth2_refresh_tokens SET revoked = 1 WHERE token_hash = $1 AND client_id = $2",
        )
        .bind(&digest)
        .bind(client_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete expired access and refresh tokens
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let access = sqlx::query("DELETE FROM oauth2_access_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await?;

        let refresh = sqlx::query("DELETE FROM oauth2_refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(access.rows_affected() + refresh.rows_affected())
    }
}

/// Convert a database row into an [`OAuth2AccessToken`]
fn row_to_access_token(row: sqlx::sqlite::SqliteRow) -> Result<OAuth2AccessToken> {
    let user_id: String = row.try_get("user_id")?;

    Ok(OAuth2AccessToken {
        token_hash: row.try_get("token_hash")?,
        client_id: row.try_get("client_id")?,
        user_id: Uuid::parse_str(&user_id)?,
        scope: row.try_get("scope")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked: row.try_get("revoked")?,
    })
}

/// Convert a database row into an [`OAuth2RefreshToken`]
fn row_to_refresh_token(row: sqlx::sqlite::SqliteRow) -> Result<OAuth2RefreshToken> {
    let user_id: String = row.try_get("user_id")?;

    Ok(OAuth2RefreshToken {
        token_hash: row.try_get("token_hash")?,
        client_id: row.try_get("client_id")?,
        user_id: Uuid::parse_str(&user_id)?,
        scope: row.try_get("scope")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked: row.try_get("revoked")?,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration;

    fn access_token_record(plaintext: &str, expires_in_secs: i64) -> OAuth2AccessToken {
        let now = Utc::now();
        OAuth2AccessToken {
            token_hash: crypto::token_digest(plaintext),
            client_id: "c1".to_owned(),
            user_id: Uuid::new_v4(),
            scope: Some("email".to_owned()),
            issued_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
            revoked: false,
        }
    }

    #[tokio::test]
    async fn test_access_token_lookup_by_plaintext() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        db.store_access_token(&access_token_record("T1", 3600))
            .await?;

        let found = db.get_access_token("T1", Utc::now()).await?;
        assert!(found.is_some());
        assert_eq!(found.unwrap().scope, Some("email".to_owned()));

        assert!(db.get_access_token("other", Utc::now()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_access_token_is_not_found() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        db.store_access_token(&access_token_record("T2", -1)).await?;

        assert!(db.get_access_token("T2", Utc::now()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_revoked_access_token_is_not_found() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        db.store_access_token(&access_token_record("T3", 3600))
            .await?;

        assert!(db.revoke_access_token("T3", "c1").await?);
        assert!(db.get_access_token("T3", Utc::now()).await?.is_none());

        // Revoking for the wrong client touches nothing
        assert!(!db.revoke_access_token("T3", "c2").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_token_rotation_consumes_once() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        let now = Utc::now();
        db.store_refresh_token(&OAuth2RefreshToken {
            token_hash: crypto::token_digest("R1"),
            client_id: "c1".to_owned(),
            user_id: Uuid::new_v4(),
            scope: None,
            created_at: now,
            expires_at: now + Duration::days(30),
            revoked: false,
        })
        .await?;

        assert!(db.consume_refresh_token("R1", "c1", now).await?.is_some());
        assert!(db.consume_refresh_token("R1", "c1", now).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        db.store_access_token(&access_token_record("stale", -10))
            .await?;
        db.store_access_token(&access_token_record("live", 3600))
            .await?;

        let purged = db.purge_expired_tokens(Utc::now()).await?;
        assert_eq!(purged, 1);
        assert!(db.get_access_token("live", Utc::now()).await?.is_some());
        Ok(())
    }
}
