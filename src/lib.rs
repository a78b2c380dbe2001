// ABOUTME: Main library entry point for the Xstar Mail authorization server
// ABOUTME: Provides the OAuth 2.0 authorization-code flow behind "Login with Xstar Mail"
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Xstar Mail

#![deny(unsafe_code)]

//! # Xstar Auth Server
//!
//! The authorization server behind "Login with Xstar Mail". Third-party
//! websites authenticate Xstar Mail users through the OAuth 2.0
//! authorization-code flow: the browser is sent to `/oauth2/authorize`, the
//! integrating site exchanges the resulting single-use code at
//! `/oauth2/token`, and reads scoped identity claims from `/oauth2/userinfo`.
//!
//! ## Architecture
//!
//! - **`oauth2_server`**: protocol core - client registry, authorization and
//!   token endpoints, rate limiting, axum routes
//! - **database**: sqlx/SQLite persistence for clients, codes, and tokens
//! - **auth**: validation of resource-owner session cookies minted by the
//!   external login service
//! - **config**: environment-variable driven server configuration
//!
//! Account management, the login UI, billing, and mailbox synchronization are
//! separate services; this crate only consumes the session cookies they mint
//! and the user records they own.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use xstar_auth_server::config::environment::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Xstar auth server configured for port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Resource-owner session validation (cookies minted by the login service)
pub mod auth;

/// Environment-based configuration management
pub mod config;

/// System-wide constants and environment accessors
pub mod constants;

/// Random credential generation and secret hashing helpers
pub mod crypto;

/// Database management for users, clients, codes, and tokens
pub mod database;

/// Unified error handling with `AppError` and `ErrorCode`
pub mod errors;

/// Logging configuration and structured logging setup
pub mod logging;

/// Core domain models shared across modules
pub mod models;

/// OAuth 2.0 authorization server implementation
pub mod oauth2_server;

/// HTTP server assembly and background maintenance tasks
pub mod server;
