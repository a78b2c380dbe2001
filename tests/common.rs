// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides common database, resource, client, and session helpers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]
//! Shared test utilities for `xstar_auth_server`

use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::{Arc, Once};
use uuid::Uuid;
use xstar_auth_server::{
    auth::SessionClaims,
    config::environment::{
        DatabaseConfig, DatabaseUrl, LogLevel, RateLimitConfig, SecurityConfig, ServerConfig,
        SessionConfig, TokenLifetimeConfig,
    },
    constants::oauth::SESSION_COOKIE,
    database::Database,
    models::User,
    oauth2_server::client_registry::{ClientRegistry, RegisterClientParams},
    oauth2_server::models::OAuth2Client,
    server::ServerResources,
};

/// Shared secret for minting test session cookies
pub const TEST_SESSION_SECRET: &str = "test-session-secret";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .init();
    });
}

/// Standard in-memory test database
pub async fn create_test_database() -> Result<Arc<Database>> {
    init_test_logging();
    Ok(Arc::new(Database::new("sqlite::memory:").await?))
}

/// Credential lifetimes used by tests
pub fn test_lifetimes() -> TokenLifetimeConfig {
    TokenLifetimeConfig {
        auth_code_ttl_secs: 600,
        access_token_ttl_secs: 3600,
    }
}

/// Server configuration used by tests
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        base_url: "http://localhost:8445".to_owned(),
        login_url: "http://localhost:8446/login".to_owned(),
        log_level: LogLevel::Warn,
        database: DatabaseConfig {
            url: DatabaseUrl::Memory,
        },
        session: SessionConfig {
            jwt_secret: TEST_SESSION_SECRET.to_owned(),
        },
        token_lifetimes: test_lifetimes(),
        security: SecurityConfig {
            cors_origins: vec!["*".to_owned()],
            rate_limit: RateLimitConfig {
                // High enough that functional tests never trip it
                enabled: true,
                token_requests_per_window: 10_000,
                authorize_requests_per_window: 10_000,
                window_seconds: 60,
            },
        },
    }
}

/// Standard test resources over an in-memory database
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    init_test_logging();
    let database = Database::new("sqlite::memory:").await?;
    Ok(Arc::new(ServerResources::new(
        database,
        Arc::new(test_config()),
    )))
}

/// Test resources over a caller-provided database URL (file-backed tests)
pub async fn create_test_resources_with_url(database_url: &str) -> Result<Arc<ServerResources>> {
    init_test_logging();
    let database = Database::new(database_url).await?;
    Ok(Arc::new(ServerResources::new(
        database,
        Arc::new(test_config()),
    )))
}

/// Register a confidential client with one redirect URI
///
/// Returns the stored record and the plaintext secret.
pub async fn register_test_client(
    database: &Arc<Database>,
    redirect_uri: &str,
    scope: Option<&str>,
    auto_approve: bool,
) -> Result<(OAuth2Client, String)> {
    let registry = ClientRegistry::new(Arc::clone(database));
    let (client, secret) = registry
        .register(RegisterClientParams {
            redirect_uris: vec![redirect_uri.to_owned()],
            client_name: Some("Test Application".to_owned()),
            owner_user_id: None,
            scope: scope.map(str::to_owned),
            auto_approve,
        })
        .await?;

    Ok((client, secret))
}

/// Create a standard test user
pub async fn create_test_user(database: &Database, email: &str) -> Result<User> {
    let mut user = User::new(email.to_owned(), Some("Test User".to_owned()));
    user.email_verified = true;
    database.create_user(&user).await?;
    Ok(user)
}

/// Mint a session cookie header value for a user, as the login service would
pub fn mint_session_cookie(user_id: Uuid, email: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: user_id.to_string(),
        email: email.to_owned(),
        iat: now,
        exp: now + 3600,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SESSION_SECRET.as_bytes()),
    )
    .expect("session encoding cannot fail with a static secret");

    format!("{SESSION_COOKIE}={token}")
}
