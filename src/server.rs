// ABOUTME: HTTP server assembly, shared resources, and background maintenance tasks
// ABOUTME: Wires the OAuth routes, middleware layers, and the expiry sweeper together
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

use crate::auth::SessionManager;
use crate::config::environment::ServerConfig;
use crate::constants::limits::DEFAULT_SWEEP_INTERVAL_SECS;
use crate::database::Database;
use crate::oauth2_server::{OAuth2AuthorizationServer, OAuth2RateLimiter, OAuth2Routes};
use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Json, Router};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Hard ceiling on request handling; store timeouts fire well before this
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared resources handed to every route handler
pub struct ServerResources {
    /// Shared database handle
    pub database: Arc<Database>,
    /// OAuth 2.0 protocol core
    pub auth_server: OAuth2AuthorizationServer,
    /// Session-cookie validator
    pub session_manager: Arc<SessionManager>,
    /// Per-IP and per-client rate limiter
    pub rate_limiter: OAuth2RateLimiter,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Create new server resources with proper Arc sharing
    #[must_use]
    pub fn new(database: Database, config: Arc<ServerConfig>) -> Self {
        let database = Arc::new(database);
        let auth_server = OAuth2AuthorizationServer::new(
            Arc::clone(&database),
            config.token_lifetimes.clone(),
        );
        let session_manager = Arc::new(SessionManager::new(config.session.jwt_secret.as_bytes()));
        let rate_limiter = OAuth2RateLimiter::new(config.security.rate_limit.clone());

        Self {
            database,
            auth_server,
            session_manager,
            rate_limiter,
            config,
        }
    }
}

/// The Xstar Mail authorization server
pub struct AuthServer {
    resources: Arc<ServerResources>,
}

impl AuthServer {
    /// Create a server over prepared resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    /// Build the full application router with middleware layers
    #[must_use]
    pub fn router(&self) -> Router {
        let allowed_origins: Vec<HeaderValue> = self
            .resources
            .config
            .security
            .cors_origins
            .iter()
            .filter(|origin| origin.as_str() != "*")
            .filter_map(|origin| origin.parse().ok())
            .collect();

        let cors = if allowed_origins.is_empty() {
            // Credential-less endpoints only; browsers call userinfo and
            // token through their own backends in the normal flow
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST])
        } else {
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST])
        };

        Router::new()
            .merge(OAuth2Routes::routes(Arc::clone(&self.resources)))
            .route("/health", get(Self::handle_health))
            .layer(cors)
            .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self, port: u16) -> Result<()> {
        // Detached: the sweeper lives as long as the process
        let _sweeper = spawn_expiry_sweeper(Arc::clone(&self.resources.database));

        let app = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Authorization server listening on {addr}");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    /// Liveness probe (GET /health)
    async fn handle_health() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "ok",
            "service": crate::constants::service::NAME,
            "version": crate::constants::service::VERSION,
        }))
    }
}

/// Periodically purge expired authorization codes and tokens
///
/// Expiry is enforced lazily on every consume and read; the sweeper only
/// reclaims storage, so a missed tick is harmless.
pub fn spawn_expiry_sweeper(database: Arc<Database>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let now = Utc::now();

            match database.purge_expired_codes(now).await {
                Ok(purged) if purged > 0 => info!("Purged {purged} expired authorization codes"),
                Ok(_) => {}
                Err(e) => warn!("Authorization code sweep failed: {e:#}"),
            }

            match database.purge_expired_tokens(now).await {
                Ok(purged) if purged > 0 => info!("Purged {purged} expired tokens"),
                Ok(_) => {}
                Err(e) => warn!("Token sweep failed: {e:#}"),
            }
        }
    })
}
