// ABOUTME: Registered-client resolution, redirect-URI matching, and secret verification
// ABOUTME: Registration happens out-of-band via the operator CLI, never over HTTP
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

use super::models::{OAuth2Client, OAuth2Error};
use crate::crypto;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Parameters for registering a client via the operator CLI
#[derive(Debug)]
pub struct RegisterClientParams {
    /// Redirect URIs to register; each is matched exactly at authorize time
    pub redirect_uris: Vec<String>,
    /// Human-readable client name for the consent page
    pub client_name: Option<String>,
    /// Mail-account user that owns this registration
    pub owner_user_id: Option<Uuid>,
    /// Space-delimited scopes the client may request
    pub scope: Option<String>,
    /// First-party clients skip the consent page
    pub auto_approve: bool,
}

/// Resolves `client_id`s to registered clients and verifies their credentials
#[derive(Clone)]
pub struct ClientRegistry {
    database: Arc<Database>,
}

impl ClientRegistry {
    /// Creates a new client registry over the shared database
    #[must_use]
    pub const fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Resolve a client by its public `client_id`
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the client is unknown.
    pub async fn resolve(&self, client_id: &str) -> AppResult<OAuth2Client> {
        self.database
            .get_oauth2_client(client_id)
            .await
            .map_err(|e| AppError::database(format!("Client lookup failed: {e}")))?
            .ok_or_else(|| AppError::not_found("OAuth2 client"))
    }

    /// Verify a presented redirect URI against the registered set
    ///
    /// Exact string equality only - no scheme/host relaxation, no prefix or
    /// wildcard matching. Anything looser reopens open-redirect and
    /// URI-confusion attacks.
    #[must_use]
    pub fn verify_redirect_uri(client: &OAuth2Client, candidate: &str) -> bool {
        client.redirect_uris.iter().any(|uri| uri == candidate)
    }

    /// Validate client credentials for the token and revocation endpoints
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` for an unknown client or a wrong secret;
    /// the two cases are indistinguishable in the response.
    pub async fn validate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<OAuth2Client, OAuth2Error> {
        let client = self.resolve(client_id).await.map_err(|e| {
            tracing::warn!("OAuth client {client_id} lookup failed: {e}");
            OAuth2Error::invalid_client()
        })?;

        // Argon2 verification recomputes the hash, so comparison cost does
        // not depend on where the secrets diverge.
        if !crypto::verify_secret(client_secret, &client.client_secret_hash) {
            tracing::warn!("OAuth client {client_id} secret validation failed");
            return Err(OAuth2Error::invalid_client());
        }

        Ok(client)
    }

    /// Register a new client and return the record plus the plaintext secret
    ///
    /// The plaintext secret is shown exactly once, at registration time.
    ///
    /// # Errors
    ///
    /// Returns an error if a redirect URI fails vetting, credential
    /// generation fails, or the store rejects the insert.
    pub async fn register(
        &self,
        params: RegisterClientParams,
    ) -> AppResult<(OAuth2Client, String)> {
        if params.redirect_uris.is_empty() {
            return Err(AppError::invalid_input(
                "At least one redirect_uri is required",
            ));
        }

        for uri in &params.redirect_uris {
            if !is_valid_redirect_uri(uri) {
                return Err(AppError::invalid_input(format!(
                    "Invalid redirect_uri: {uri}"
                )));
            }
        }

        let client_id = generate_client_id();
        let client_secret = crypto::generate_random_string(32)?;
        let client_secret_hash = crypto::hash_secret(&client_secret)?;

        let client = OAuth2Client {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.clone(),
            client_secret_hash,
            redirect_uris: params.redirect_uris,
            client_name: params.client_name,
            owner_user_id: params.owner_user_id,
            scope: params.scope,
            auto_approve: params.auto_approve,
            created_at: Utc::now(),
        };

        self.database
            .store_oauth2_client(&client)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, client_id = %client_id, "Failed to store OAuth2 client registration");
                AppError::database("Failed to store client registration")
            })?;

        Ok((client, client_secret))
    }

    /// Rotate a client's secret, returning the new plaintext secret
    ///
    /// # Errors
    ///
    /// Returns an error if the client is unknown or the update fails.
    pub async fn rotate_secret(&self, client_id: &str) -> AppResult<String> {
        // Resolve first so an unknown client fails before generating credentials
        self.resolve(client_id).await?;

        let new_secret = crypto::generate_random_string(32)?;
        let new_hash = crypto::hash_secret(&new_secret)?;

        self.database
            .update_oauth2_client_secret(client_id, &new_hash)
            .await
            .map_err(|e| AppError::database(format!("Failed to rotate client secret: {e}")))?;

        Ok(new_secret)
    }
}

/// Generate a public client identifier
fn generate_client_id() -> String {
    format!("xstar_client_{}", Uuid::new_v4().simple())
}

/// Check if a redirect URI is acceptable for registration
///
/// Registration-time vetting (absolute URI, no fragment, no wildcard, https
/// outside loopback) is separate from the exact-equality check at authorize
/// time; both apply.
fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.trim().is_empty() {
        return false;
    }

    // Fragments are a token-leak channel (RFC 6749 Section 3.1.2)
    if uri.contains('#') {
        tracing::warn!("Rejected redirect_uri with fragment: {uri}");
        return false;
    }

    // Wildcards invite subdomain-bypass registrations
    if uri.contains('*') {
        tracing::warn!("Rejected redirect_uri with wildcard: {uri}");
        return false;
    }

    let Ok(parsed) = url::Url::parse(uri) else {
        tracing::warn!("Rejected malformed redirect_uri: {uri}");
        return false;
    };

    let is_loopback =
        parsed.host_str() == Some("localhost") || parsed.host_str() == Some("127.0.0.1");

    match parsed.scheme() {
        "https" => true,
        "http" if is_loopback => true,
        _ => {
            tracing::warn!("Rejected redirect_uri with non-HTTPS scheme for non-localhost: {uri}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_uri_vetting() {
        assert!(is_valid_redirect_uri("https://app.example/cb"));
        assert!(is_valid_redirect_uri("http://localhost:3000/cb"));
        assert!(is_valid_redirect_uri("http://127.0.0.1:3000/cb"));

        assert!(!is_valid_redirect_uri("http://app.example/cb"));
        assert!(!is_valid_redirect_uri("https://app.example/cb#fragment"));
        assert!(!is_valid_redirect_uri("https://*.example/cb"));
        assert!(!is_valid_redirect_uri(""));
        assert!(!is_valid_redirect_uri("not a uri"));
    }

    #[test]
    fn test_verify_redirect_uri_is_exact() {
        let client = OAuth2Client {
            id: "id".to_owned(),
            client_id: "c1".to_owned(),
            client_secret_hash: "hash".to_owned(),
            redirect_uris: vec!["https://app.example/cb".to_owned()],
            client_name: None,
            owner_user_id: None,
            scope: None,
            auto_approve: false,
            created_at: Utc::now(),
        };

        assert!(ClientRegistry::verify_redirect_uri(
            &client,
            "https://app.example/cb"
        ));

        // No prefix, suffix, case, or trailing-slash relaxation
        assert!(!ClientRegistry::verify_redirect_uri(
            &client,
            "https://app.example/cb/"
        ));
        assert!(!ClientRegistry::verify_redirect_uri(
            &client,
            "https://app.example/cb?extra=1"
        ));
        assert!(!ClientRegistry::verify_redirect_uri(
            &client,
            "https://APP.example/cb"
        ));
        assert!(!ClientRegistry::verify_redirect_uri(
            &client,
            "https://app.example/c"
        ));
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        assert_ne!(generate_client_id(), generate_client_id());
        assert!(generate_client_id().starts_with("xstar_client_"));
    }
}
