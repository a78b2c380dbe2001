// ABOUTME: System-wide constants and configuration values for the Xstar auth server
// ABOUTME: Contains protocol constants, TTL bounds, and environment-based configuration defaults
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Constants Module
//!
//! Application constants and environment variable configuration.
//! This module provides both hardcoded constants and environment accessors.

use std::env;

/// Network port defaults
pub mod ports {
    /// Default HTTP port for the authorization server
    pub const DEFAULT_HTTP_PORT: u16 = 8445;
}

/// OAuth 2.0 protocol constants
pub mod oauth {
    /// The only supported response type on the authorization endpoint
    pub const RESPONSE_TYPE_CODE: &str = "code";

    /// Grant type for exchanging an authorization code
    pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

    /// Grant type for rotating a refresh token
    pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";

    /// Token type advertised in token responses
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";

    /// Scope granting access to the `email` and `email_verified` claims
    pub const SCOPE_EMAIL: &str = "email";

    /// Scope granting access to the `name` claim
    pub const SCOPE_PROFILE: &str = "profile";

    /// Scopes advertised in the discovery document
    pub const SUPPORTED_SCOPES: &[&str] = &[SCOPE_EMAIL, SCOPE_PROFILE];

    /// Authorization codes carry 32 bytes (256 bits) of entropy
    pub const AUTH_CODE_BYTES: usize = 32;

    /// Access and refresh tokens carry 32 bytes (256 bits) of entropy
    pub const ACCESS_TOKEN_BYTES: usize = 32;

    /// Lower bound on the authorization-code lifetime in seconds
    pub const MIN_AUTH_CODE_TTL_SECS: i64 = 60;

    /// Upper bound (and default) authorization-code lifetime in seconds
    pub const MAX_AUTH_CODE_TTL_SECS: i64 = 600;

    /// Default access-token lifetime in seconds
    pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

    /// Refresh tokens live for 30 days
    pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

    /// Name of the session cookie minted by the login service
    pub const SESSION_COOKIE: &str = "xstar_session";
}

/// Rate limiting defaults
pub mod limits {
    /// Requests allowed per window on `/oauth2/token`, per client and per IP
    pub const DEFAULT_TOKEN_RATE_LIMIT: u32 = 30;

    /// Requests allowed per window on `/oauth2/authorize`, per IP
    pub const DEFAULT_AUTHORIZE_RATE_LIMIT: u32 = 60;

    /// Fixed rate-limit window in seconds
    pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

    /// Rate limiter map size that triggers lazy cleanup of stale entries
    pub const RATE_LIMIT_CLEANUP_THRESHOLD: usize = 10_000;

    /// Interval between background sweeps of expired codes and tokens
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

    /// Database pool acquire timeout in seconds; store I/O never blocks longer
    pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
}

/// Service identity
pub mod service {
    /// Service name used in logs and discovery metadata
    pub const NAME: &str = "xstar-auth-server";

    /// Server version from Cargo.toml
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Environment-based configuration accessors
pub mod env_config {
    use super::env;

    /// Get HTTP server port from environment or default
    #[must_use]
    pub fn http_port() -> u16 {
        env::var("HTTP_PORT")
            .unwrap_or_else(|_| crate::constants::ports::DEFAULT_HTTP_PORT.to_string())
            .parse()
            .unwrap_or(crate::constants::ports::DEFAULT_HTTP_PORT)
    }

    /// Get database URL from environment or default
    #[must_use]
    pub fn database_url() -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/xstar-auth.db".into())
    }

    /// Get the externally visible base URL (issuer) from environment or default
    #[must_use]
    pub fn base_url() -> String {
        env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{}", http_port()))
    }

    /// Get the login service URL the authorize endpoint defers to
    #[must_use]
    pub fn login_url() -> String {
        env::var("LOGIN_URL").unwrap_or_else(|_| format!("{}/login", base_url()))
    }

    /// Get the shared secret used to validate session cookies
    #[must_use]
    pub fn session_jwt_secret() -> Option<String> {
        env::var("SESSION_JWT_SECRET").ok()
    }

    /// Get authorization-code TTL seconds from environment or default
    #[must_use]
    pub fn auth_code_ttl_secs() -> i64 {
        env::var("AUTH_CODE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::constants::oauth::MAX_AUTH_CODE_TTL_SECS)
    }

    /// Get access-token TTL seconds from environment or default
    #[must_use]
    pub fn access_token_ttl_secs() -> i64 {
        env::var("ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::constants::oauth::DEFAULT_ACCESS_TOKEN_TTL_SECS)
    }

    /// Get log level from environment or default
    #[must_use]
    pub fn log_level() -> String {
        env::var("RUST_LOG").unwrap_or_else(|_| "info".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_code_ttl_bounds() {
        assert!(oauth::MIN_AUTH_CODE_TTL_SECS < oauth::MAX_AUTH_CODE_TTL_SECS);
        assert!(oauth::MIN_AUTH_CODE_TTL_SECS >= 60);
        assert!(oauth::MAX_AUTH_CODE_TTL_SECS <= 600);
    }

    #[test]
    fn test_entropy_sizes() {
        // Codes need at least 128 bits, tokens at least 256 bits
        assert!(oauth::AUTH_CODE_BYTES * 8 >= 128);
        assert!(oauth::ACCESS_TOKEN_BYTES * 8 >= 256);
    }
}
