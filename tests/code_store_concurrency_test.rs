// ABOUTME: Concurrency tests for single-use authorization code consumption
// ABOUTME: Races parallel exchanges against one code and requires exactly one winner
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{create_test_resources_with_url, create_test_user, register_test_client};
use std::sync::Arc;
use uuid::Uuid;
use xstar_auth_server::crypto;
use xstar_auth_server::database::Database;
use xstar_auth_server::oauth2_server::models::{OAuth2AuthCode, TokenRequest};

const REDIRECT_URI: &str = "https://app.example/cb";
const PARALLEL_CALLERS: usize = 50;

fn file_database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite:{}", dir.path().join("concurrency.db").display())
}

async fn seed_code(database: &Database, client_id: &str, user_id: Uuid) -> Result<String> {
    let code = crypto::generate_random_string(32)?;
    let now = Utc::now();

    database
        .store_oauth2_auth_code(&OAuth2AuthCode {
            code: code.clone(),
            client_id: client_id.to_owned(),
            user_id,
            redirect_uri: REDIRECT_URI.to_owned(),
            scope: Some("email".to_owned()),
            issued_at: now,
            expires_at: now + Duration::seconds(600),
            used: false,
        })
        .await?;

    Ok(code)
}

/// Raw store level: N parallel consume calls on one code, one winner.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_consume_has_exactly_one_winner() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let database = Arc::new(Database::new(&file_database_url(&dir)).await?);

    let user_id = Uuid::new_v4();
    let code = seed_code(&database, "c1", user_id).await?;

    let mut handles = Vec::with_capacity(PARALLEL_CALLERS);
    for _ in 0..PARALLEL_CALLERS {
        let database = Arc::clone(&database);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            database
                .consume_auth_code(&code, "c1", REDIRECT_URI, Utc::now())
                .await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await? {
            Ok(Some(consumed)) => {
                assert_eq!(consumed.user_id, user_id);
                successes += 1;
            }
            Ok(None) => rejections += 1,
            Err(e) => panic!("store failure during race: {e:#}"),
        }
    }

    assert_eq!(successes, 1, "exactly one caller may consume the code");
    assert_eq!(rejections, PARALLEL_CALLERS - 1);

    Ok(())
}

/// Full token-endpoint level: two racing exchanges, one 200 and one invalid_grant.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchange_yields_one_token() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let resources = create_test_resources_with_url(&file_database_url(&dir)).await?;

    let (client, secret) =
        register_test_client(&resources.database, REDIRECT_URI, Some("email"), true).await?;
    let user = create_test_user(&resources.database, "race@mail.test").await?;
    let code = seed_code(&resources.database, &client.client_id, user.id).await?;

    let exchange = |resources: Arc<xstar_auth_server::server::ServerResources>,
                    client_id: String,
                    secret: String,
                    code: String| async move {
        resources
            .auth_server
            .token(TokenRequest {
                grant_type: "authorization_code".to_owned(),
                code: Some(code),
                redirect_uri: Some(REDIRECT_URI.to_owned()),
                client_id,
                client_secret: secret,
                refresh_token: None,
            })
            .await
    };

    let a = tokio::spawn(exchange(
        Arc::clone(&resources),
        client.client_id.clone(),
        secret.clone(),
        code.clone(),
    ));
    let b = tokio::spawn(exchange(
        Arc::clone(&resources),
        client.client_id.clone(),
        secret.clone(),
        code.clone(),
    ));

    let outcomes = [a.await?, b.await?];
    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    let invalid_grants = outcomes
        .iter()
        .filter(|o| {
            o.as_ref()
                .is_err_and(|e| e.error == "invalid_grant")
        })
        .count();

    assert_eq!(successes, 1, "exactly one exchange may succeed");
    assert_eq!(invalid_grants, 1, "the loser must see invalid_grant");

    Ok(())
}

/// Consumption failures must not mask later legitimate rejections: after the
/// race, the code stays used forever.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_code_stays_consumed_after_race() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let database = Arc::new(Database::new(&file_database_url(&dir)).await?);
    let code = seed_code(&database, "c1", Uuid::new_v4()).await?;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let database = Arc::clone(&database);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            database
                .consume_auth_code(&code, "c1", REDIRECT_URI, Utc::now())
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let stored = database.get_oauth2_auth_code(&code).await?.unwrap();
    assert!(stored.used);

    assert!(database
        .consume_auth_code(&code, "c1", REDIRECT_URI, Utc::now())
        .await?
        .is_none());

    Ok(())
}
