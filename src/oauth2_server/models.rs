// ABOUTME: OAuth 2.0 data models for the authorization-code flow
// ABOUTME: Request/response structures, persistence records, and the RFC 6749 error vocabulary
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Xstar Mail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth 2.0 Authorization Request
#[derive(Debug, Deserialize, Clone)]
pub struct AuthorizeRequest {
    /// Response type (only `code` is supported)
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response; must exactly match a registered URI
    pub redirect_uri: String,
    /// Requested scopes, space-delimited
    pub scope: Option<String>,
    /// Opaque client-side CSRF value; echoed byte-for-byte, never stored
    /// or interpreted server-side
    pub state: Option<String>,
}

/// OAuth 2.0 Authorization Response
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    /// Authorization code
    pub code: String,
    /// State parameter (if provided in request)
    pub state: Option<String>,
}

/// OAuth 2.0 Token Request
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code` or `refresh_token`)
    pub grant_type: String,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI (must match the value presented at authorization)
    pub redirect_uri: Option<String>,
    /// Client ID
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Opaque access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Expires in seconds
    pub expires_in: i64,
    /// Scopes granted
    pub scope: Option<String>,
    /// Refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Token revocation request (RFC 7009 shape)
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// The token to revoke (access or refresh)
    pub token: String,
    /// Optional caller hint, `access_token` or `refresh_token`
    pub token_type_hint: Option<String>,
    /// Client ID
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

/// Userinfo claim set
///
/// `sub` is always present; the other claims are gated by the token's scope.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfoResponse {
    /// Stable user identifier
    pub sub: String,
    /// Mail address (requires the `email` scope)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the mail address is verified (requires the `email` scope)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Display name (requires the `profile` scope)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// OAuth 2.0 Error Response
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    pub error_description: Option<String>,
    /// URI for error information
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_client` error
    ///
    /// Deliberately identical for "client not found" and "secret wrong" so
    /// the response is not an oracle.
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: Some("Client authentication failed".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `invalid_redirect_uri` error
    ///
    /// Only ever rendered inline; the presented URI is untrusted and must
    /// never be redirected to.
    #[must_use]
    pub fn invalid_redirect_uri() -> Self {
        Self {
            error: "invalid_redirect_uri".to_owned(),
            error_description: Some(
                "redirect_uri is not registered for this client".to_owned(),
            ),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-3.1.2".to_owned(),
            ),
        }
    }

    /// Create an `invalid_grant` error
    ///
    /// One description for every consume failure (unknown, expired, used,
    /// mismatched binding); internal logs differentiate, responses do not.
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self {
            error: "unsupported_response_type".to_owned(),
            error_description: Some("Only the 'code' response_type is supported".to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some("Grant type not supported".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unauthorized_client` error
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self {
            error: "unauthorized_client".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `access_denied` error
    #[must_use]
    pub fn access_denied() -> Self {
        Self {
            error: "access_denied".to_owned(),
            error_description: Some("The resource owner denied the request".to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_token` error (bearer-token usage, RFC 6750)
    #[must_use]
    pub fn invalid_token() -> Self {
        Self {
            error: "invalid_token".to_owned(),
            error_description: Some("The access token is invalid or expired".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6750#section-3.1".to_owned()),
        }
    }

    /// Create a `server_error` error
    #[must_use]
    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_owned(),
            error_description: Some("The authorization server encountered an internal error".to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// HTTP status code for this error when returned as a JSON body
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.error.as_str() {
            "invalid_client" | "invalid_token" => 401,
            "server_error" => 500,
            _ => 400,
        }
    }
}

impl std::fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for OAuth2Error {}

/// Stored OAuth 2.0 Client
#[derive(Debug, Clone)]
pub struct OAuth2Client {
    /// Internal database ID
    pub id: String,
    /// Public OAuth 2.0 client identifier
    pub client_id: String,
    /// Argon2id hash of the client secret; the plaintext is never stored
    pub client_secret_hash: String,
    /// Registered redirect URIs; matching is exact string equality
    pub redirect_uris: Vec<String>,
    /// Human-readable client name shown on the consent page
    pub client_name: Option<String>,
    /// Mail-account user that owns this registration
    pub owner_user_id: Option<Uuid>,
    /// Space-delimited scopes this client may request
    pub scope: Option<String>,
    /// First-party clients skip the consent page
    pub auto_approve: bool,
    /// When this client was registered
    pub created_at: DateTime<Utc>,
}

/// OAuth 2.0 Authorization Code record
#[derive(Debug, Clone)]
pub struct OAuth2AuthCode {
    /// The authorization code value
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Resource owner who authorized the code
    pub user_id: Uuid,
    /// Exact redirect URI presented at issuance; re-verified at exchange
    pub redirect_uri: String,
    /// Space-delimited granted scopes
    pub scope: Option<String>,
    /// When this code was minted
    pub issued_at: DateTime<Utc>,
    /// Hard expiry boundary
    pub expires_at: DateTime<Utc>,
    /// Flips false to true exactly once, atomically, at exchange
    pub used: bool,
}

/// OAuth 2.0 Access Token record
///
/// Only the SHA-256 digest of the token value is stored; the plaintext
/// leaves the server once, in the token response.
#[derive(Debug, Clone)]
pub struct OAuth2AccessToken {
    /// SHA-256 hex digest of the token value
    pub token_hash: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Resource owner the token acts for
    pub user_id: Uuid,
    /// Space-delimited granted scopes
    pub scope: Option<String>,
    /// When this token was issued
    pub issued_at: DateTime<Utc>,
    /// When this token expires
    pub expires_at: DateTime<Utc>,
    /// Out-of-band revocation flag
    pub revoked: bool,
}

/// OAuth 2.0 Refresh Token record
#[derive(Debug, Clone)]
pub struct OAuth2RefreshToken {
    /// SHA-256 hex digest of the token value
    pub token_hash: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Resource owner the token acts for
    pub user_id: Uuid,
    /// Space-delimited granted scopes
    pub scope: Option<String>,
    /// When this token was issued
    pub created_at: DateTime<Utc>,
    /// When this token expires
    pub expires_at: DateTime<Utc>,
    /// Set on rotation or explicit revocation
    pub revoked: bool,
}

/// Check whether a space-delimited scope string contains a scope token
#[must_use]
pub fn scope_contains(scope: Option<&str>, wanted: &str) -> bool {
    scope.is_some_and(|s| s.split(' ').any(|token| token == wanted))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(OAuth2Error::invalid_client().http_status(), 401);
        assert_eq!(OAuth2Error::invalid_token().http_status(), 401);
        assert_eq!(OAuth2Error::server_error().http_status(), 500);
        assert_eq!(OAuth2Error::invalid_grant("nope").http_status(), 400);
        assert_eq!(OAuth2Error::access_denied().http_status(), 400);
    }

    #[test]
    fn test_error_serialization() {
        let error = OAuth2Error::invalid_grant("Invalid or expired authorization code");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"error\":\"invalid_grant\""));
        assert!(json.contains("Invalid or expired authorization code"));
    }

    #[test]
    fn test_scope_contains() {
        assert!(scope_contains(Some("email profile"), "email"));
        assert!(scope_contains(Some("email"), "email"));
        assert!(!scope_contains(Some("emailx"), "email"));
        assert!(!scope_contains(Some("profile"), "email"));
        assert!(!scope_contains(None, "email"));
    }

    #[test]
    fn test_userinfo_omits_ungranted_claims() {
        let info = UserInfoResponse {
            sub: "u1".to_owned(),
            email: None,
            email_verified: None,
            name: None,
        };

        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, "{\"sub\":\"u1\"}");
    }

    #[test]
    fn test_token_response_without_refresh() {
        let response = TokenResponse {
            access_token: "tok".to_owned(),
            token_type: "Bearer".to_owned(),
            expires_in: 3600,
            scope: Some("email".to_owned()),
            refresh_token: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(json.contains("\"expires_in\":3600"));
    }
}
