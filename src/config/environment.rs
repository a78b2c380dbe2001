// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Environment-based configuration management for production deployment

use crate::constants::{env_config, limits, oauth};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and above
    Warn,
    /// Informational and above
    #[default]
    Info,
    /// Debug and above
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Convert to `tracing::Level`
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }

    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Type-safe database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite {
        /// Path to the database file
        path: PathBuf,
    },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".into(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/xstar-auth.db"),
        }
    }
}

impl std::fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Externally visible base URL (issuer) for discovery and redirects
    pub base_url: String,
    /// URL of the external login service the authorize endpoint defers to
    pub login_url: String,
    /// Log level
    pub log_level: LogLevel,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Session cookie validation configuration
    pub session: SessionConfig,
    /// OAuth 2.0 credential lifetimes
    pub token_lifetimes: TokenLifetimeConfig,
    /// Security settings
    pub security: SecurityConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite path or `:memory:`)
    pub url: DatabaseUrl,
}

/// Session cookie validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Shared HS256 secret used to validate `xstar_session` cookies.
    /// Minted and owned by the login service; this server only validates.
    pub jwt_secret: String,
}

/// OAuth 2.0 credential lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLifetimeConfig {
    /// Authorization-code TTL in seconds, clamped to the 60-600 s window
    pub auth_code_ttl_secs: i64,
    /// Access-token TTL in seconds
    pub access_token_ttl_secs: i64,
}

/// Security settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// CORS allowed origins
    pub cors_origins: Vec<String>,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests per window on the token endpoint (per client and per IP)
    pub token_requests_per_window: u32,
    /// Requests per window on the authorize endpoint (per IP)
    pub authorize_requests_per_window: u32,
    /// Window duration in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_requests_per_window: limits::DEFAULT_TOKEN_RATE_LIMIT,
            authorize_requests_per_window: limits::DEFAULT_AUTHORIZE_RATE_LIMIT,
            window_seconds: limits::DEFAULT_RATE_LIMIT_WINDOW_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `SESSION_JWT_SECRET` is unset or a numeric
    /// environment override fails to parse.
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let jwt_secret = env_config::session_jwt_secret()
            .context("SESSION_JWT_SECRET must be set (shared with the login service)")?;

        let config = Self {
            http_port: env_config::http_port(),
            base_url: env_config::base_url(),
            login_url: env_config::login_url(),
            log_level: LogLevel::from_str_or_default(&env_config::log_level()),

            database: DatabaseConfig {
                url: DatabaseUrl::parse_url(&env_config::database_url()),
            },

            session: SessionConfig { jwt_secret },

            token_lifetimes: TokenLifetimeConfig {
                auth_code_ttl_secs: env_config::auth_code_ttl_secs().clamp(
                    oauth::MIN_AUTH_CODE_TTL_SECS,
                    oauth::MAX_AUTH_CODE_TTL_SECS,
                ),
                access_token_ttl_secs: env_config::access_token_ttl_secs(),
            },

            security: SecurityConfig {
                cors_origins: env_var_or("CORS_ORIGINS", "*")?
                    .split(',')
                    .map(|s| s.trim().to_owned())
                    .collect(),
                rate_limit: RateLimitConfig {
                    enabled: env_var_or("RATE_LIMIT_ENABLED", "true")?
                        .parse()
                        .context("Invalid RATE_LIMIT_ENABLED value")?,
                    token_requests_per_window: env_var_or(
                        "RATE_LIMIT_TOKEN_REQUESTS",
                        &limits::DEFAULT_TOKEN_RATE_LIMIT.to_string(),
                    )?
                    .parse()
                    .context("Invalid RATE_LIMIT_TOKEN_REQUESTS value")?,
                    authorize_requests_per_window: env_var_or(
                        "RATE_LIMIT_AUTHORIZE_REQUESTS",
                        &limits::DEFAULT_AUTHORIZE_RATE_LIMIT.to_string(),
                    )?
                    .parse()
                    .context("Invalid RATE_LIMIT_AUTHORIZE_REQUESTS value")?,
                    window_seconds: env_var_or(
                        "RATE_LIMIT_WINDOW_SECS",
                        &limits::DEFAULT_RATE_LIMIT_WINDOW_SECS.to_string(),
                    )?
                    .parse()
                    .context("Invalid RATE_LIMIT_WINDOW_SECS value")?,
                },
            },
        };

        Ok(config)
    }

    /// One-line summary of the loaded configuration for startup logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "http_port={} base_url={} database={} code_ttl={}s token_ttl={}s rate_limit={}",
            self.http_port,
            self.base_url,
            self.database.url,
            self.token_lifetimes.auth_code_ttl_secs,
            self.token_lifetimes.access_token_ttl_secs,
            self.security.rate_limit.enabled
        )
    }
}

/// Read an environment variable with a default fallback
fn env_var_or(name: &str, default: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) => Ok(value),
        Err(env::VarError::NotPresent) => Ok(default.to_owned()),
        Err(e) => Err(e).with_context(|| format!("Failed to read environment variable {name}")),
    }
}
