// ABOUTME: OAuth 2.0 client registration database operations
// ABOUTME: Stores client identities, hashed secrets, and registered redirect URIs

use super::Database;
use crate::oauth2_server::models::OAuth2Client;
use anyhow::{anyhow, Result};
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the OAuth client table
    pub(super) async fn migrate_clients(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth2_clients (
                id TEXT PRIMARY KEY,
                client_id TEXT UNIQUE NOT NULL,
                client_secret_hash TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                client_name TEXT,
                owner_user_id TEXT,
                scope TEXT,
                auto_approve BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth2_clients_client_id ON oauth2_clients(client_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Store a registered OAuth client
    ///
    /// # Errors
    ///
    /// Returns an error if the `client_id` already exists or the insert fails.
    pub async fn store_oauth2_client(&self, client: &OAuth2Client) -> Result<()> {
        let redirect_uris = serde_json::to_string(&client.redirect_uris)?;

        sqlx::query(
            r"
            INSERT INTO oauth2_clients (
                id, client_id, client_secret_hash, redirect_uris,
                client_name, owner_user_id, scope, auto_approve, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(&client.id)
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(redirect_uris)
        .bind(&client.client_name)
        .bind(client.owner_user_id.map(|id| id.to_string()))
        .bind(&client.scope)
        .bind(client.auto_approve)
        .bind(client.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| anyhow!("Failed to store OAuth2 client {}: {e}", client.client_id))?;

        Ok(())
    }

    /// Get a client by its public `client_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub async fn get_oauth2_client(&self, client_id: &str) -> Result<Option<OAuth2Client>> {
        let row = sqlx::query(
            r"
            SELECT id, client_id, client_secret_hash, redirect_uris,
                   client_name, owner_user_id, scope, auto_approve, created_at
            FROM oauth2_clients WHERE client_id = $1
            ",
        )
        .bind(client_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_client).transpose()
    }

    /// Rotate a client's secret hash
    ///
    /// # Errors
    ///
    /// Returns an error if the client does not exist or the update fails.
    pub async fn update_oauth2_client_secret(
        &self,
        client_id: &str,
        new_secret_hash: &str,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE oauth2_clients SET client_secret_hash = $2 WHERE client_id = $1")
                .bind(client_id)
                .bind(new_secret_hash)
                .execute(self.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("OAuth2 client {client_id} not found"));
        }

        Ok(())
    }

    /// List all registered clients (operator CLI)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored row is corrupt.
    pub async fn list_oauth2_clients(&self) -> Result<Vec<OAuth2Client>> {
        let rows = sqlx::query(
            r"
            SELECT id, client_id, client_secret_hash, redirect_uris,
                   client_name, owner_user_id, scope, auto_approve, created_at
            FROM oauth2_clients ORDER BY created_at DESC
            ",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(row_to_client).collect()
    }
}

/// Convert a database row into an [`OAuth2Client`]
fn row_to_client(row: sqlx::sqlite::SqliteRow) -> Result<OAuth2Client> {
    let redirect_uris_json: String = row.try_get("redirect_uris")?;
    let owner_user_id: Option<String> = row.try_get("owner_user_id")?;

    Ok(OAuth2Client {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        client_secret_hash: row.try_get("client_secret_hash")?,
        redirect_uris: serde_json::from_str(&redirect_uris_json)?,
        client_name: row.try_get("client_name")?,
        owner_user_id: owner_user_id.map(|id| Uuid::parse_str(&id)).transpose()?,
        scope: row.try_get("scope")?,
        auto_approve: row.try_get("auto_approve")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Utc;

    fn sample_client(client_id: &str) -> OAuth2Client {
        OAuth2Client {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_owned(),
            client_secret_hash: "$argon2id$stub".to_owned(),
            redirect_uris: vec!["https://app.example/cb".to_owned()],
            client_name: Some("Example App".to_owned()),
            owner_user_id: None,
            scope: Some("email profile".to_owned()),
            auto_approve: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_client_roundtrip() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        let client = sample_client("client_abc");

        db.store_oauth2_client(&client).await?;

        let loaded = db.get_oauth2_client("client_abc").await?.unwrap();
        assert_eq!(loaded.redirect_uris, client.redirect_uris);
        assert_eq!(loaded.scope, client.scope);
        assert!(!loaded.auto_approve);

        assert!(db.get_oauth2_client("missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_client_id_rejected() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        db.store_oauth2_client(&sample_client("dup")).await?;
        assert!(db.store_oauth2_client(&sample_client("dup")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_secret_rotation() -> Result<()> {
        let db = Database::new("sqlite::memory:").await?;
        db.store_oauth2_client(&sample_client("rotate")).await?;

        db.update_oauth2_client_secret("rotate", "$argon2id$new")
            .await?;
        let loaded = db.get_oauth2_client("rotate").await?.unwrap();
        assert_eq!(loaded.client_secret_hash, "$argon2id$new");

        assert!(db
            .update_oauth2_client_secret("missing", "$argon2id$x")
            .await
            .is_err());
        Ok(())
    }
}
