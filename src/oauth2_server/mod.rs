// ABOUTME: OAuth 2.0 authorization server implementation for "Login with Xstar Mail"
// ABOUTME: Provides the authorization, token, userinfo, and revocation endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Xstar Mail

/// Client resolution, secret verification, and operator registration
pub mod client_registry;
/// OAuth 2.0 authorization server endpoints
pub mod endpoints;
/// OAuth 2.0 data models and types
pub mod models;
/// Rate limiting for OAuth 2.0 endpoints
pub mod rate_limiting;
/// HTTP route handlers for the OAuth 2.0 endpoints
pub mod routes;

/// Registered-client resolution and verification
pub use client_registry::ClientRegistry;

/// OAuth 2.0 authorization server core logic
pub use endpoints::OAuth2AuthorizationServer;

/// Authorization request
pub use models::AuthorizeRequest;
/// Authorization response
pub use models::AuthorizeResponse;
/// OAuth 2.0 authorization code record
pub use models::OAuth2AuthCode;
/// OAuth 2.0 client record
pub use models::OAuth2Client;
/// OAuth 2.0 error response
pub use models::OAuth2Error;
/// Token exchange request
pub use models::TokenRequest;
/// Token exchange response
pub use models::TokenResponse;
/// Userinfo claim set
pub use models::UserInfoResponse;

/// OAuth 2.0 endpoint rate limiting
pub use rate_limiting::OAuth2RateLimiter;

/// OAuth 2.0 HTTP routes
pub use routes::OAuth2Routes;
