// ABOUTME: Resource-owner session validation for the authorization endpoint
// ABOUTME: Validates HS256 session cookies minted by the external login service
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

//! # Session Validation
//!
//! The login/session UI is a separate service. It authenticates mail-account
//! users and sets an `xstar_session` cookie containing an HS256 JWT signed
//! with a secret shared with this server. The authorization endpoint only
//! validates that cookie; it never mints sessions or handles passwords.

use crate::constants::oauth::SESSION_COOKIE;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT validation error with detailed information
#[derive(Debug, Clone)]
pub enum JwtValidationError {
    /// Token has expired
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },
    /// Token signature is invalid
    TokenInvalid {
        /// Reason for invalidity
        reason: String,
    },
    /// Token is malformed (not proper JWT format)
    TokenMalformed {
        /// Details about malformation
        details: String,
    },
}

impl std::fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenExpired { expired_at } => {
                write!(
                    f,
                    "session token expired at {}",
                    expired_at.format("%Y-%m-%d %H:%M:%S UTC")
                )
            }
            Self::TokenInvalid { reason } => {
                write!(f, "session token signature is invalid: {reason}")
            }
            Self::TokenMalformed { details } => {
                write!(f, "session token is malformed: {details}")
            }
        }
    }
}

impl std::error::Error for JwtValidationError {}

/// Claims carried in the session cookie
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User ID
    pub sub: String,
    /// User email
    pub email: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Authenticated resource owner extracted from a session cookie
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Authenticated user ID
    pub user_id: Uuid,
    /// Email recorded at login time
    pub email: String,
}

/// Validates session cookies against the secret shared with the login service
pub struct SessionManager {
    decoding_key: DecodingKey,
}

impl SessionManager {
    /// Create a new session manager from the shared HS256 secret
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Validate a session token and extract the resource-owner identity
    ///
    /// # Errors
    ///
    /// Returns a [`JwtValidationError`] describing whether the token was
    /// expired, forged, or malformed. Callers treat every variant the same
    /// way (redirect to the login service); the distinction is for logs.
    pub fn validate_session(&self, token: &str) -> Result<SessionIdentity, JwtValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    let expired_at = decode_expiry_unverified(token)
                        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default());
                    JwtValidationError::TokenExpired { expired_at }
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    JwtValidationError::TokenInvalid {
                        reason: "signature mismatch".into(),
                    }
                }
                other => JwtValidationError::TokenMalformed {
                    details: format!("{other:?}"),
                },
            },
        )?;

        let user_id =
            Uuid::parse_str(&data.claims.sub).map_err(|e| JwtValidationError::TokenMalformed {
                details: format!("sub is not a UUID: {e}"),
            })?;

        Ok(SessionIdentity {
            user_id,
            email: data.claims.email,
        })
    }
}

/// Read the `exp` claim from a token without verifying it, for error detail
fn decode_expiry_unverified(token: &str) -> Option<DateTime<Utc>> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = value.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Extract the session token from a `Cookie` request header
#[must_use]
pub fn extract_session_token(cookie_header: &str) -> Option<String> {
    for cookie in cookie_header.split(';') {
        let cookie = cookie.trim();
        if let Some(token) = cookie
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
        {
            return Some(token.to_owned());
        }
    }
    None
}
