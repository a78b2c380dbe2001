// ABOUTME: OAuth 2.0 authorization, token, userinfo, and revocation endpoint logic
// ABOUTME: Framework-free protocol core; HTTP concerns live in routes.rs
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

use super::client_registry::ClientRegistry;
use super::models::{
    scope_contains, AuthorizeRequest, AuthorizeResponse, OAuth2AccessToken, OAuth2AuthCode,
    OAuth2Client, OAuth2Error, OAuth2RefreshToken, RevokeRequest, TokenRequest, TokenResponse,
    UserInfoResponse,
};
use crate::config::environment::TokenLifetimeConfig;
use crate::constants::oauth::{
    ACCESS_TOKEN_BYTES, AUTH_CODE_BYTES, GRANT_TYPE_AUTHORIZATION_CODE, GRANT_TYPE_REFRESH_TOKEN,
    REFRESH_TOKEN_TTL_DAYS, RESPONSE_TYPE_CODE, SCOPE_EMAIL, SCOPE_PROFILE, TOKEN_TYPE_BEARER,
};
use crate::crypto;
use crate::database::Database;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// How an authorize-request rejection must be delivered
///
/// Failures detected before the redirect URI is confirmed trusted are
/// rendered inline and never redirected; everything later goes back to the
/// client via redirect query parameters.
#[derive(Debug)]
pub enum AuthorizeReject {
    /// Render an error page; the presented redirect URI is untrusted
    Inline(OAuth2Error),
    /// Redirect to the (validated) redirect URI with `error` and `state`
    Redirect(OAuth2Error),
}

/// OAuth 2.0 Authorization Server
pub struct OAuth2AuthorizationServer {
    client_registry: ClientRegistry,
    database: Arc<Database>,
    lifetimes: TokenLifetimeConfig,
}

impl OAuth2AuthorizationServer {
    /// Create the authorization server over the shared database
    #[must_use]
    pub fn new(database: Arc<Database>, lifetimes: TokenLifetimeConfig) -> Self {
        let client_registry = ClientRegistry::new(Arc::clone(&database));

        Self {
            client_registry,
            database,
            lifetimes,
        }
    }

    /// Access the client registry (consent page, CLI)
    #[must_use]
    pub const fn client_registry(&self) -> &ClientRegistry {
        &self.client_registry
    }

    /// Validate an authorize request up to the point where the redirect URI
    /// is trusted (GET /oauth2/authorize, steps before consent)
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizeReject::Inline`] while the redirect URI is
    /// untrusted (unknown client, unregistered URI) and
    /// [`AuthorizeReject::Redirect`] afterwards (bad response type,
    /// overreaching scope).
    pub async fn validate_authorize_request(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<OAuth2Client, AuthorizeReject> {
        let client = self
            .client_registry
            .resolve(&request.client_id)
            .await
            .map_err(|e| {
                tracing::warn!(client_id = %request.client_id, "Authorize request for unknown client: {e}");
                AuthorizeReject::Inline(OAuth2Error::invalid_client())
            })?;

        // The presented redirect URI is attacker-controlled until it matches
        // the registered set exactly; a mismatch must never redirect.
        if !ClientRegistry::verify_redirect_uri(&client, &request.redirect_uri) {
            tracing::warn!(
                client_id = %request.client_id,
                redirect_uri = %request.redirect_uri,
                "Authorize request with unregistered redirect_uri"
            );
            return Err(AuthorizeReject::Inline(OAuth2Error::invalid_redirect_uri()));
        }

        if request.response_type != RESPONSE_TYPE_CODE {
            return Err(AuthorizeReject::Redirect(
                OAuth2Error::unsupported_response_type(),
            ));
        }

        if let Some(requested) = request.scope.as_deref() {
            if let Some(overreach) = scope_overreach(requested, client.scope.as_deref()) {
                return Err(AuthorizeReject::Redirect(OAuth2Error::invalid_scope(
                    &format!("Scope '{overreach}' is not registered for this client"),
                )));
            }
        }

        Ok(client)
    }

    /// Mint and persist an authorization code for a consented request
    ///
    /// # Errors
    ///
    /// Returns a redirect-class `server_error` if code generation or the
    /// store write fails.
    pub async fn issue_code(
        &self,
        request: &AuthorizeRequest,
        user_id: Uuid,
    ) -> Result<AuthorizeResponse, OAuth2Error> {
        // A primary-key collision on 256 bits of entropy means the RNG is
        // broken, but the store treats it as an internal error and we retry
        // once with a fresh value before giving up.
        for attempt in 0..2 {
            let code = crypto::generate_random_string(AUTH_CODE_BYTES).map_err(|e| {
                tracing::error!("Failed to generate authorization code: {e}");
                OAuth2Error::server_error()
            })?;

            let now = Utc::now();
            let auth_code = OAuth2AuthCode {
                code: code.clone(),
                client_id: request.client_id.clone(),
                user_id,
                redirect_uri: request.redirect_uri.clone(),
                scope: request.scope.clone(),
                issued_at: now,
                expires_at: now + Duration::seconds(self.lifetimes.auth_code_ttl_secs),
                used: false,
            };

            match self.database.store_oauth2_auth_code(&auth_code).await {
                Ok(()) => {
                    tracing::info!(
                        client_id = %request.client_id,
                        user_id = %user_id,
                        "Issued authorization code"
                    );
                    return Ok(AuthorizeResponse {
                        code,
                        state: request.state.clone(),
                    });
                }
                Err(e) if attempt == 0 => {
                    tracing::warn!("Authorization code store rejected insert, regenerating: {e}");
                }
                Err(e) => {
                    tracing::error!(
                        client_id = %request.client_id,
                        "Failed to store authorization code: {e:#}"
                    );
                }
            }
        }

        Err(OAuth2Error::server_error())
    }

    /// Handle a token request (POST /oauth2/token)
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` when client authentication fails,
    /// `invalid_grant` for any consume failure, `unsupported_grant_type`
    /// for unknown grants, and `server_error` on store failure.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuth2Error> {
        // Client authentication comes first for every grant type; nothing
        // about the grant is inspected for an unauthenticated client.
        let _client = self
            .client_registry
            .validate_client(&request.client_id, &request.client_secret)
            .await?;

        match request.grant_type.as_str() {
            GRANT_TYPE_AUTHORIZATION_CODE => self.handle_authorization_code_grant(request).await,
            GRANT_TYPE_REFRESH_TOKEN => self.handle_refresh_token_grant(request).await,
            _ => Err(OAuth2Error::unsupported_grant_type()),
        }
    }

    /// Handle the `authorization_code` grant
    async fn handle_authorization_code_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let code = request
            .code
            .ok_or_else(|| OAuth2Error::invalid_request("Missing authorization code"))?;

        let redirect_uri = request
            .redirect_uri
            .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri"))?;

        // Single atomic step: binding check, expiry check, used check, and
        // the used=true transition. Racing callers see one success.
        let auth_code = self
            .database
            .consume_auth_code(&code, &request.client_id, &redirect_uri, Utc::now())
            .await
            .map_err(|e| {
                tracing::error!(
                    client_id = %request.client_id,
                    "Failed to atomically consume authorization code: {e:#}"
                );
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| {
                tracing::warn!(
                    client_id = %request.client_id,
                    "Authorization code rejected: not found, already used, expired, or mismatched binding"
                );
                OAuth2Error::invalid_grant("Invalid or expired authorization code")
            })?;

        self.mint_token_pair(&request.client_id, auth_code.user_id, auth_code.scope)
            .await
    }

    /// Handle the `refresh_token` grant with rotation
    async fn handle_refresh_token_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let refresh_token = request
            .refresh_token
            .ok_or_else(|| OAuth2Error::invalid_request("Missing refresh_token"))?;

        let old = self
            .database
            .consume_refresh_token(&refresh_token, &request.client_id, Utc::now())
            .await
            .map_err(|e| {
                tracing::error!(
                    client_id = %request.client_id,
                    "Failed to atomically consume refresh token: {e:#}"
                );
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| {
                tracing::warn!(
                    client_id = %request.client_id,
                    "Refresh token rejected: not found, revoked, expired, or mismatched client"
                );
                OAuth2Error::invalid_grant("Invalid or expired refresh token")
            })?;

        tracing::info!(
            client_id = %request.client_id,
            user_id = %old.user_id,
            "Refresh token rotated"
        );

        self.mint_token_pair(&request.client_id, old.user_id, old.scope)
            .await
    }

    /// Mint, persist, and return an access/refresh token pair
    async fn mint_token_pair(
        &self,
        client_id: &str,
        user_id: Uuid,
        scope: Option<String>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let access_token = crypto::generate_random_string(ACCESS_TOKEN_BYTES).map_err(|e| {
            tracing::error!("Failed to generate access token: {e}");
            OAuth2Error::server_error()
        })?;
        let refresh_token = crypto::generate_random_string(ACCESS_TOKEN_BYTES).map_err(|e| {
            tracing::error!("Failed to generate refresh token: {e}");
            OAuth2Error::server_error()
        })?;

        let now = Utc::now();
        let access_record = OAuth2AccessToken {
            token_hash: crypto::token_digest(&access_token),
            client_id: client_id.to_owned(),
            user_id,
            scope: scope.clone(),
            issued_at: now,
            expires_at: now + Duration::seconds(self.lifetimes.access_token_ttl_secs),
            revoked: false,
        };

        let refresh_record = OAuth2RefreshToken {
            token_hash: crypto::token_digest(&refresh_token),
            client_id: client_id.to_owned(),
            user_id,
            scope: scope.clone(),
            created_at: now,
            expires_at: now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
            revoked: false,
        };

        self.database
            .store_access_token(&access_record)
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client_id, "Failed to store access token: {e:#}");
                OAuth2Error::server_error()
            })?;

        self.database
            .store_refresh_token(&refresh_record)
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client_id, "Failed to store refresh token: {e:#}");
                OAuth2Error::server_error()
            })?;

        Ok(TokenResponse {
            access_token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in: self.lifetimes.access_token_ttl_secs,
            scope,
            refresh_token: Some(refresh_token),
        })
    }

    /// Resolve a bearer token into scoped identity claims (GET /oauth2/userinfo)
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` for missing, expired, or revoked tokens and
    /// for tokens whose user no longer exists; `server_error` on store
    /// failure.
    pub async fn userinfo(&self, bearer_token: &str) -> Result<UserInfoResponse, OAuth2Error> {
        let token = self
            .database
            .get_access_token(bearer_token, Utc::now())
            .await
            .map_err(|e| {
                tracing::error!("Access token lookup failed: {e:#}");
                OAuth2Error::server_error()
            })?
            .ok_or_else(OAuth2Error::invalid_token)?;

        let user = self
            .database
            .get_user(token.user_id)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %token.user_id, "User lookup failed: {e:#}");
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| {
                tracing::warn!(user_id = %token.user_id, "Valid token for missing user");
                OAuth2Error::invalid_token()
            })?;

        let scope = token.scope.as_deref();
        let email_granted = scope_contains(scope, SCOPE_EMAIL);
        let profile_granted = scope_contains(scope, SCOPE_PROFILE);

        Ok(UserInfoResponse {
            sub: user.id.to_string(),
            email: email_granted.then_some(user.email),
            email_verified: email_granted.then_some(user.email_verified),
            name: profile_granted.then(|| user.display_name).flatten(),
        })
    }

    /// Revoke an access or refresh token (POST /oauth2/revoke)
    ///
    /// RFC 7009 semantics: the client authenticates, and a well-formed
    /// request succeeds whether or not the token matched anything.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` on bad credentials, `server_error` on store
    /// failure.
    pub async fn revoke(&self, request: RevokeRequest) -> Result<(), OAuth2Error> {
        let _client = self
            .client_registry
            .validate_client(&request.client_id, &request.client_secret)
            .await?;

        // The hint only orders the lookups; both stores are always checked
        // so a wrong hint cannot shield a token.
        let stores: [&str; 2] = match request.token_type_hint.as_deref() {
            Some("refresh_token") => ["refresh", "access"],
            _ => ["access", "refresh"],
        };

        for store in stores {
            let revoked = match store {
                "access" => self
                    .database
                    .revoke_access_token(&request.token, &request.client_id)
                    .await,
                _ => self
                    .database
                    .revoke_refresh_token(&request.token, &request.client_id)
                    .await,
            }
            .map_err(|e| {
                tracing::error!(client_id = %request.client_id, "Revocation failed: {e:#}");
                OAuth2Error::server_error()
            })?;

            if revoked {
                tracing::info!(client_id = %request.client_id, "Token revoked");
                break;
            }
        }

        Ok(())
    }
}

/// Find the first requested scope outside the client's registered set
fn scope_overreach<'a>(requested: &'a str, registered: Option<&str>) -> Option<&'a str> {
    requested
        .split(' ')
        .filter(|s| !s.is_empty())
        .find(|s| !scope_contains(registered, s))
}
