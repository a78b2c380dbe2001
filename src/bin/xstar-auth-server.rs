// ABOUTME: Server binary for the Xstar Mail OAuth 2.0 authorization server
// ABOUTME: Loads configuration, opens the database, and serves the OAuth endpoints
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Xstar Auth Server Binary
//!
//! Starts the "Login with Xstar Mail" authorization server: the authorize,
//! token, userinfo, and revocation endpoints over a shared SQLite store.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use xstar_auth_server::{
    config::environment::ServerConfig,
    database::Database,
    logging,
    server::{AuthServer, ServerResources},
};

#[derive(Parser)]
#[command(name = "xstar-auth-server")]
#[command(about = "Xstar Mail - OAuth 2.0 authorization server")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    info!("Starting Xstar Mail authorization server");
    info!("{}", config.summary());

    let database = Database::new(&config.database.url.to_connection_string()).await?;
    info!("Database initialized: {}", config.database.url);

    let port = config.http_port;
    let resources = Arc::new(ServerResources::new(database, Arc::new(config)));
    let server = AuthServer::new(resources);

    display_available_endpoints(port);

    if let Err(e) = server.run(port).await {
        error!("Server error: {e:#}");
        return Err(e);
    }

    Ok(())
}

/// Display the API surface with bind addresses at startup
fn display_available_endpoints(port: u16) {
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());

    info!("=== Available API Endpoints ===");
    info!("OAuth 2.0:");
    info!("   Authorization:  GET  http://{host}:{port}/oauth2/authorize");
    info!("   Consent:        POST http://{host}:{port}/oauth2/authorize/consent");
    info!("   Token Exchange: POST http://{host}:{port}/oauth2/token");
    info!("   Userinfo:       GET  http://{host}:{port}/oauth2/userinfo");
    info!("   Revocation:     POST http://{host}:{port}/oauth2/revoke");
    info!("Discovery:");
    info!("   Metadata:       GET  http://{host}:{port}/.well-known/oauth-authorization-server");
    info!("Monitoring:");
    info!("   Health Check:   GET  http://{host}:{port}/health");
    info!("=== End of Endpoint List ===");
}
