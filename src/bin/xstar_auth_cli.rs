// ABOUTME: Operator CLI for the Xstar Mail authorization server
// ABOUTME: Registers OAuth clients, rotates secrets, and seeds development users
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Xstar Auth CLI
//!
//! Client registration is an operator action, not an HTTP surface: new
//! integrations are provisioned here, and the generated secret is printed
//! exactly once.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;
use xstar_auth_server::{
    constants::env_config,
    database::Database,
    models::User,
    oauth2_server::client_registry::{ClientRegistry, RegisterClientParams},
};

#[derive(Parser)]
#[command(name = "xstar-auth-cli")]
#[command(about = "Xstar Mail - authorization server operations")]
struct Cli {
    /// Database URL (defaults to DATABASE_URL or the standard path)
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new OAuth client and print its credentials
    RegisterClient {
        /// Redirect URIs to register (exact-match at authorize time)
        #[arg(long, required = true)]
        redirect_uri: Vec<String>,

        /// Human-readable client name shown on the consent page
        #[arg(long)]
        name: Option<String>,

        /// Mail-account user that owns this registration
        #[arg(long)]
        owner: Option<Uuid>,

        /// Space-delimited scopes the client may request
        #[arg(long)]
        scope: Option<String>,

        /// First-party client: skip the consent page
        #[arg(long)]
        auto_approve: bool,
    },

    /// Rotate a client's secret and print the new value
    RotateSecret {
        /// Public client identifier
        client_id: String,
    },

    /// List registered clients
    ListClients,

    /// Seed a mail-account user projection (development and testing)
    SeedUser {
        /// Mail address
        email: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Mark the address as verified
        #[arg(long)]
        verified: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let database_url = cli
        .database_url
        .unwrap_or_else(env_config::database_url);
    let database = Arc::new(Database::new(&database_url).await?);
    let registry = ClientRegistry::new(Arc::clone(&database));

    match cli.command {
        Command::RegisterClient {
            redirect_uri,
            name,
            owner,
            scope,
            auto_approve,
        } => {
            let (client, secret) = registry
                .register(RegisterClientParams {
                    redirect_uris: redirect_uri,
                    client_name: name,
                    owner_user_id: owner,
                    scope,
                    auto_approve,
                })
                .await?;

            println!("client_id:     {}", client.client_id);
            println!("client_secret: {secret}");
            println!();
            println!("Store the secret now - it is not recoverable later.");
        }

        Command::RotateSecret { client_id } => {
            let secret = registry.rotate_secret(&client_id).await?;
            println!("client_id:     {client_id}");
            println!("client_secret: {secret}");
        }

        Command::ListClients => {
            for client in database.list_oauth2_clients().await? {
                println!(
                    "{}  name={}  auto_approve={}  redirect_uris={}",
                    client.client_id,
                    client.client_name.as_deref().unwrap_or("-"),
                    client.auto_approve,
                    client.redirect_uris.join(",")
                );
            }
        }

        Command::SeedUser {
            email,
            name,
            verified,
        } => {
            let mut user = User::new(email, name);
            user.email_verified = verified;
            let user_id = database.create_user(&user).await?;
            println!("user_id: {user_id}");
        }
    }

    Ok(())
}
