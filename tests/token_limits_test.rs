// ABOUTME: Integration tests for FIFO limits on active access and refresh tokens
// ABOUTME: Verifies oldest-first eviction per scope and that a zero limit blocks issuance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration;
use warden::codes;
use warden::config::{LimitScope, OAuth2Config, TokenLimit};
use warden::context::ExecutionContext;
use warden::flows::{
    ClientCredentialsFlow, ClientCredentialsGrant, OAuth2Authorization, RefreshTokenFlow,
    RefreshTokenGrant,
};
use warden::storage::{secret_digest, RecordFilter};
use warden::Outcome;

use common::{failure_code, fast_config, payload_str, ray, Harness, TestClient};

fn limited(access: TokenLimit, refresh: TokenLimit) -> Harness {
    Harness::with_config(OAuth2Config {
        access_token_limit: access,
        refresh_token_limit: refresh,
        ..fast_config()
    })
}

async fn machine_token(harness: &Harness, client: &TestClient) -> Outcome {
    OAuth2Authorization::new(ClientCredentialsFlow::new(&harness.deps), harness.deps.clone())
        .execute(
            &mut ExecutionContext::new(),
            ray().as_str(),
            ClientCredentialsGrant {
                client: client.credentials(),
                scope: None,
            },
        )
        .await
        .unwrap()
}

// ============================================================================
// Access Tokens
// ============================================================================

#[tokio::test]
async fn test_oldest_access_token_is_evicted_first() {
    let harness = limited(
        TokenLimit::new(2, LimitScope::PerClient),
        TokenLimit::unlimited(LimitScope::PerClientUser),
    );
    let client = harness.confidential_client(&["client_credentials"]).await;

    let mut raw = Vec::new();
    for _ in 0..3 {
        raw.push(payload_str(&machine_token(&harness, &client).await, "access_token"));
        harness.clock.advance(Duration::seconds(1));
    }

    let all = harness
        .access_tokens(&RecordFilter::new().client(&client.client_id))
        .await;
    assert_eq!(all.len(), 3);
    let active = harness
        .access_tokens(
            &RecordFilter::new()
                .client(&client.client_id)
                .active_at(harness.now()),
        )
        .await;
    assert_eq!(active.len(), 2);

    let oldest = all
        .iter()
        .find(|t| t.token_digest == secret_digest(&raw[0]))
        .unwrap();
    assert!(oldest.revoked_at.is_some());
    assert!(active
        .iter()
        .all(|t| t.token_digest != secret_digest(&raw[0])));
}

#[tokio::test]
async fn test_limits_are_counted_per_client() {
    let harness = limited(
        TokenLimit::new(1, LimitScope::PerClient),
        TokenLimit::unlimited(LimitScope::PerClientUser),
    );
    let first = harness.confidential_client(&["client_credentials"]).await;
    let second = harness.confidential_client(&["client_credentials"]).await;

    assert!(machine_token(&harness, &first).await.status());
    assert!(machine_token(&harness, &second).await.status());

    let active = harness
        .access_tokens(&RecordFilter::new().active_at(harness.now()))
        .await;
    assert_eq!(active.len(), 2);
}

#[tokio::test]
async fn test_zero_limit_blocks_issuance() {
    let harness = limited(
        TokenLimit::new(0, LimitScope::PerClient),
        TokenLimit::unlimited(LimitScope::PerClientUser),
    );
    let client = harness.confidential_client(&["client_credentials"]).await;

    let outcome = machine_token(&harness, &client).await;
    assert_eq!(failure_code(&outcome), codes::oauth::UNAUTHORIZED_CLIENT);
    assert!(harness
        .access_tokens(&RecordFilter::new())
        .await
        .is_empty());
}

#[tokio::test]
async fn test_per_refresh_token_limit_keeps_one_access_token_per_parent() {
    let mut config = fast_config();
    config.access_token_limit = TokenLimit::new(1, LimitScope::PerRefreshToken);
    config.rotate_refresh_tokens = false;
    let harness = Harness::with_config(config);
    let client = harness
        .confidential_client(&["authorization_code", "refresh_token"])
        .await;
    let refresh_token = payload_str(&harness.user_tokens(&client, "user-1").await, "refresh_token");

    for _ in 0..2 {
        harness.clock.advance(Duration::seconds(1));
        let kernel =
            OAuth2Authorization::new(RefreshTokenFlow::new(&harness.deps), harness.deps.clone());
        let outcome = kernel
            .execute(
                &mut ExecutionContext::new(),
                ray().as_str(),
                RefreshTokenGrant {
                    client: client.credentials(),
                    refresh_token: Some(refresh_token.clone()),
                    scope: None,
                },
            )
            .await
            .unwrap();
        assert!(outcome.status(), "{outcome:?}");
    }

    let parent = harness
        .refresh_tokens(&RecordFilter::new().client(&client.client_id))
        .await
        .remove(0);
    let under_parent = harness
        .access_tokens(&RecordFilter::new().refresh_token(parent.id))
        .await;
    assert_eq!(under_parent.len(), 3);
    assert_eq!(
        under_parent
            .iter()
            .filter(|t| t.is_active(harness.now()))
            .count(),
        1
    );
}

// ============================================================================
// Refresh Tokens
// ============================================================================

#[tokio::test]
async fn test_refresh_tokens_are_limited_per_user() {
    let harness = limited(
        TokenLimit::unlimited(LimitScope::PerClientUser),
        TokenLimit::new(1, LimitScope::PerClientUser),
    );
    let client = harness
        .confidential_client(&["authorization_code", "refresh_token"])
        .await;

    let first = payload_str(&harness.user_tokens(&client, "alice").await, "refresh_token");
    harness.clock.advance(Duration::seconds(1));
    let second = payload_str(&harness.user_tokens(&client, "alice").await, "refresh_token");
    let other_user = payload_str(&harness.user_tokens(&client, "bob").await, "refresh_token");

    let active = harness
        .refresh_tokens(
            &RecordFilter::new()
                .client(&client.client_id)
                .active_at(harness.now()),
        )
        .await;
    let active_digests: Vec<_> = active.iter().map(|t| t.token_digest.clone()).collect();
    assert_eq!(active.len(), 2);
    assert!(!active_digests.contains(&secret_digest(&first)));
    assert!(active_digests.contains(&secret_digest(&second)));
    assert!(active_digests.contains(&secret_digest(&other_user)));
}

#[tokio::test]
async fn test_zero_refresh_limit_issues_access_tokens_only() {
    let harness = limited(
        TokenLimit::unlimited(LimitScope::PerClientUser),
        TokenLimit::new(0, LimitScope::PerClientUser),
    );
    let client = harness
        .confidential_client(&["authorization_code", "refresh_token"])
        .await;

    let outcome = harness.user_tokens(&client, "alice").await;
    assert!(outcome.status());
    assert!(outcome.client_message().get("refresh_token").is_none());
}
