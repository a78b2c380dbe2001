// ABOUTME: End-to-end tests for the authorization-code flow at the protocol-core level
// ABOUTME: Covers code issuance, exchange, replay, expiry, refresh rotation, and userinfo claims
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{create_test_resources, create_test_user, register_test_client};
use xstar_auth_server::crypto;
use xstar_auth_server::oauth2_server::models::{
    AuthorizeRequest, OAuth2AccessToken, OAuth2AuthCode, TokenRequest,
};

const REDIRECT_URI: &str = "https://app.example/cb";

fn authorize_request(client_id: &str, scope: Option<&str>, state: Option<&str>) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: client_id.to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        scope: scope.map(str::to_owned),
        state: state.map(str::to_owned),
    }
}

fn exchange_request(client_id: &str, client_secret: &str, code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_owned(),
        code: Some(code.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        client_id: client_id.to_owned(),
        client_secret: client_secret.to_owned(),
        refresh_token: None,
    }
}

#[tokio::test]
async fn test_full_flow_code_to_token_to_userinfo() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;
    let user = create_test_user(&resources.database, "u1@mail.test").await?;

    // Authorize: validate and mint a code
    let request = authorize_request(&client.client_id, Some("email"), Some("opaque-state"));
    resources
        .auth_server
        .validate_authorize_request(&request)
        .await
        .expect("valid request must pass validation");

    let authorize_response = resources.auth_server.issue_code(&request, user.id).await?;
    assert_eq!(authorize_response.state.as_deref(), Some("opaque-state"));

    // Exchange: code for token
    let token_response = resources
        .auth_server
        .token(exchange_request(
            &client.client_id,
            &secret,
            &authorize_response.code,
        ))
        .await
        .expect("first exchange must succeed");

    assert_eq!(token_response.token_type, "Bearer");
    assert_eq!(token_response.expires_in, 3600);
    assert_eq!(token_response.scope.as_deref(), Some("email"));
    assert!(token_response.refresh_token.is_some());

    // Userinfo: scoped claims
    let claims = resources
        .auth_server
        .userinfo(&token_response.access_token)
        .await
        .expect("fresh token must resolve claims");

    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.email.as_deref(), Some("u1@mail.test"));
    assert_eq!(claims.email_verified, Some(true));
    // `name` needs the profile scope, which was not granted
    assert!(claims.name.is_none());

    Ok(())
}

#[tokio::test]
async fn test_code_cannot_be_exchanged_twice() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;
    let user = create_test_user(&resources.database, "u2@mail.test").await?;

    let request = authorize_request(&client.client_id, Some("email"), None);
    let code = resources
        .auth_server
        .issue_code(&request, user.id)
        .await?
        .code;

    resources
        .auth_server
        .token(exchange_request(&client.client_id, &secret, &code))
        .await
        .expect("first exchange must succeed");

    let replay = resources
        .auth_server
        .token(exchange_request(&client.client_id, &secret, &code))
        .await;

    let error = replay.expect_err("replayed code must be rejected");
    assert_eq!(error.error, "invalid_grant");
    assert_eq!(error.http_status(), 400);

    Ok(())
}

#[tokio::test]
async fn test_wrong_client_secret_is_invalid_client() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, _secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;
    let user = create_test_user(&resources.database, "u3@mail.test").await?;

    let request = authorize_request(&client.client_id, Some("email"), None);
    let code = resources
        .auth_server
        .issue_code(&request, user.id)
        .await?
        .code;

    let error = resources
        .auth_server
        .token(exchange_request(&client.client_id, "wrong-secret", &code))
        .await
        .expect_err("wrong secret must be rejected");

    assert_eq!(error.error, "invalid_client");
    assert_eq!(error.http_status(), 401);

    // The failed attempt happened before code consumption, so the code is
    // still exchangeable with the right credentials... but only by design of
    // client auth ordering. Verify it was not burned.
    assert!(resources
        .database
        .get_oauth2_auth_code(&code)
        .await?
        .is_some_and(|c| !c.used));

    Ok(())
}

#[tokio::test]
async fn test_expired_code_is_invalid_grant() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;
    let user = create_test_user(&resources.database, "u4@mail.test").await?;

    // A code whose 600 s window elapsed 1 s ago
    let now = Utc::now();
    let code_value = crypto::generate_random_string(32)?;
    resources
        .database
        .store_oauth2_auth_code(&OAuth2AuthCode {
            code: code_value.clone(),
            client_id: client.client_id.clone(),
            user_id: user.id,
            redirect_uri: REDIRECT_URI.to_owned(),
            scope: Some("email".to_owned()),
            issued_at: now - Duration::seconds(601),
            expires_at: now - Duration::seconds(1),
            used: false,
        })
        .await?;

    let error = resources
        .auth_server
        .token(exchange_request(&client.client_id, &secret, &code_value))
        .await
        .expect_err("expired code must be rejected");

    assert_eq!(error.error, "invalid_grant");

    Ok(())
}

#[tokio::test]
async fn test_expired_access_token_fails_userinfo() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database, "u5@mail.test").await?;

    let now = Utc::now();
    let plaintext = crypto::generate_random_string(32)?;
    resources
        .database
        .store_access_token(&OAuth2AccessToken {
            token_hash: crypto::token_digest(&plaintext),
            client_id: "c1".to_owned(),
            user_id: user.id,
            scope: Some("email".to_owned()),
            issued_at: now - Duration::seconds(3601),
            expires_at: now - Duration::seconds(1),
            revoked: false,
        })
        .await?;

    let error = resources
        .auth_server
        .userinfo(&plaintext)
        .await
        .expect_err("expired token must be rejected");

    assert_eq!(error.error, "invalid_token");
    assert_eq!(error.http_status(), 401);

    Ok(())
}

#[tokio::test]
async fn test_refresh_rotation_invalidates_old_token() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;
    let user = create_test_user(&resources.database, "u6@mail.test").await?;

    let request = authorize_request(&client.client_id, Some("email"), None);
    let code = resources
        .auth_server
        .issue_code(&request, user.id)
        .await?
        .code;

    let initial = resources
        .auth_server
        .token(exchange_request(&client.client_id, &secret, &code))
        .await?;
    let old_refresh = initial.refresh_token.unwrap();

    let refresh_request = |token: &str| TokenRequest {
        grant_type: "refresh_token".to_owned(),
        code: None,
        redirect_uri: None,
        client_id: client.client_id.clone(),
        client_secret: secret.clone(),
        refresh_token: Some(token.to_owned()),
    };

    let rotated = resources
        .auth_server
        .token(refresh_request(&old_refresh))
        .await
        .expect("first rotation must succeed");
    assert_ne!(rotated.access_token, initial.access_token);
    assert!(rotated.refresh_token.is_some());

    // The consumed refresh token is dead
    let error = resources
        .auth_server
        .token(refresh_request(&old_refresh))
        .await
        .expect_err("rotated refresh token must be rejected");
    assert_eq!(error.error, "invalid_grant");

    // The new pair still works
    assert!(resources
        .auth_server
        .userinfo(&rotated.access_token)
        .await
        .is_ok());

    Ok(())
}

#[tokio::test]
async fn test_revoked_access_token_fails_userinfo() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;
    let user = create_test_user(&resources.database, "u7@mail.test").await?;

    let request = authorize_request(&client.client_id, Some("email"), None);
    let code = resources
        .auth_server
        .issue_code(&request, user.id)
        .await?
        .code;
    let tokens = resources
        .auth_server
        .token(exchange_request(&client.client_id, &secret, &code))
        .await?;

    assert!(resources
        .auth_server
        .userinfo(&tokens.access_token)
        .await
        .is_ok());

    resources
        .auth_server
        .revoke(xstar_auth_server::oauth2_server::models::RevokeRequest {
            token: tokens.access_token.clone(),
            token_type_hint: Some("access_token".to_owned()),
            client_id: client.client_id.clone(),
            client_secret: secret,
        })
        .await
        .expect("revocation must succeed");

    let error = resources
        .auth_server
        .userinfo(&tokens.access_token)
        .await
        .expect_err("revoked token must be rejected");
    assert_eq!(error.error, "invalid_token");

    Ok(())
}

#[tokio::test]
async fn test_userinfo_without_scopes_returns_sub_only() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) = register_test_client(&resources.database, REDIRECT_URI, None, true).await?;
    let user = create_test_user(&resources.database, "u8@mail.test").await?;

    let request = authorize_request(&client.client_id, None, None);
    let code = resources
        .auth_server
        .issue_code(&request, user.id)
        .await?
        .code;
    let tokens = resources
        .auth_server
        .token(exchange_request(&client.client_id, &secret, &code))
        .await?;

    let claims = resources.auth_server.userinfo(&tokens.access_token).await?;
    assert_eq!(claims.sub, user.id.to_string());
    assert!(claims.email.is_none());
    assert!(claims.email_verified.is_none());
    assert!(claims.name.is_none());

    Ok(())
}

#[tokio::test]
async fn test_profile_scope_exposes_name() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) = register_test_client(
        &resources.database,
        REDIRECT_URI,
        Some("email profile"),
        true,
    )
    .await?;
    let user = create_test_user(&resources.database, "u9@mail.test").await?;

    let request = authorize_request(&client.client_id, Some("email profile"), None);
    let code = resources
        .auth_server
        .issue_code(&request, user.id)
        .await?
        .code;
    let tokens = resources
        .auth_server
        .token(exchange_request(&client.client_id, &secret, &code))
        .await?;

    let claims = resources.auth_server.userinfo(&tokens.access_token).await?;
    assert_eq!(claims.name.as_deref(), Some("Test User"));
    assert_eq!(claims.email.as_deref(), Some("u9@mail.test"));

    Ok(())
}

#[tokio::test]
async fn test_unsupported_grant_type_rejected() -> Result<()> {
    let resources = create_test_resources().await?;
    let (client, secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;

    let error = resources
        .auth_server
        .token(TokenRequest {
            grant_type: "client_credentials".to_owned(),
            code: None,
            redirect_uri: None,
            client_id: client.client_id,
            client_secret: secret,
            refresh_token: None,
        })
        .await
        .expect_err("unsupported grant must be rejected");

    assert_eq!(error.error, "unsupported_grant_type");

    Ok(())
}
