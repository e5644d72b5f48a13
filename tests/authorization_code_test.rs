// ABOUTME: Integration tests for the authorization request and authorization_code grant flows
// ABOUTME: Covers PKCE binding, redirect matching, single use under concurrency, and expiry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use chrono::Duration;
use warden::codes;
use warden::config::{LimitScope, OAuth2Config, TokenLimit};
use warden::constants::events;
use warden::context::ExecutionContext;
use warden::flows::{
    pkce, AuthorizationCodeFlow, AuthorizationCodeGrant, AuthorizationRequest, AuthorizeFlow,
    ClientCredentials, FlowDependencies, OAuth2Authorization,
};
use warden::storage::{RecordFilter, StorageBackend};
use warden::{FaultCode, Outcome};

use common::{
    failure_code, fast_config, payload_str, ray, Harness, TestClient, REDIRECT_URI as REDIRECT,
    VERIFIER,
};

fn authorization_request(client: &TestClient, challenge: Option<String>) -> AuthorizationRequest {
    AuthorizationRequest {
        response_type: "code".into(),
        client_id: client.client_id.clone(),
        redirect_uri: REDIRECT.into(),
        scope: Some("read".into()),
        state: Some("xyz".into()),
        code_challenge_method: challenge.as_ref().map(|_| "S256".to_owned()),
        code_challenge: challenge,
        user_id: "user-42".into(),
    }
}

async fn authorize(harness: &Harness, request: AuthorizationRequest) -> Outcome {
    OAuth2Authorization::new(AuthorizeFlow::new(&harness.deps), harness.deps.clone())
        .execute(&mut ExecutionContext::new(), ray().as_str(), request)
        .await
        .unwrap()
}

async fn issue_code(harness: &Harness, client: &TestClient) -> String {
    let outcome = authorize(
        harness,
        authorization_request(client, Some(pkce::s256_challenge(VERIFIER))),
    )
    .await;
    payload_str(&outcome, "code")
}

fn exchange(client: &TestClient, code: &str, verifier: Option<&str>) -> AuthorizationCodeGrant {
    AuthorizationCodeGrant {
        client: client.credentials(),
        code: Some(code.to_owned()),
        redirect_uri: Some(REDIRECT.to_owned()),
        code_verifier: verifier.map(str::to_owned),
    }
}

fn token_kernel(harness: &Harness) -> OAuth2Authorization<AuthorizationCodeFlow> {
    OAuth2Authorization::new(AuthorizationCodeFlow::new(&harness.deps), harness.deps.clone())
}

async fn redeem(harness: &Harness, grant: AuthorizationCodeGrant) -> Outcome {
    token_kernel(harness)
        .execute(&mut ExecutionContext::new(), ray().as_str(), grant)
        .await
        .unwrap()
}

// ============================================================================
// Authorization Endpoint
// ============================================================================

#[tokio::test]
async fn test_authorize_echoes_state_and_stores_only_a_digest() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let ray_id = ray();

    let outcome = OAuth2Authorization::new(AuthorizeFlow::new(&harness.deps), harness.deps.clone())
        .execute(
            &mut ExecutionContext::new(),
            ray_id.as_str(),
            authorization_request(&client, Some(pkce::s256_challenge(VERIFIER))),
        )
        .await
        .unwrap();

    let code = payload_str(&outcome, "code");
    assert_eq!(payload_str(&outcome, "state"), "xyz");
    assert_eq!(payload_str(&outcome, "redirect_uri"), REDIRECT);
    assert_eq!(outcome.client_message()["expires_in"], 600);

    let mut tx = harness.storage.begin().await.unwrap();
    let stored = tx
        .authorization_codes()
        .list(&RecordFilter::new().client(&client.client_id))
        .await
        .unwrap();
    drop(tx);
    assert_eq!(stored.len(), 1);
    assert_ne!(stored[0].code_digest, code);
    assert_eq!(stored[0].user_id, "user-42");

    let audit = harness.audit_for(&ray_id).await;
    assert_eq!(audit[0].event, events::CODE_ISSUED);
}

#[tokio::test]
async fn test_unregistered_redirect_uri_is_rejected() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let mut request = authorization_request(&client, Some(pkce::s256_challenge(VERIFIER)));
    request.redirect_uri = "http://localhost:9999/elsewhere".into();

    let outcome = authorize(&harness, request).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_REQUEST);
}

#[tokio::test]
async fn test_public_client_without_pkce_is_rejected() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let outcome = authorize(&harness, authorization_request(&client, None)).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_REQUEST);
}

#[tokio::test]
async fn test_unsupported_response_type_and_scope() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;

    let mut token_request = authorization_request(&client, Some(pkce::s256_challenge(VERIFIER)));
    token_request.response_type = "token".into();
    let outcome = authorize(&harness, token_request).await;
    assert_eq!(failure_code(&outcome), codes::oauth::UNSUPPORTED_RESPONSE_TYPE);

    let mut greedy = authorization_request(&client, Some(pkce::s256_challenge(VERIFIER)));
    greedy.scope = Some("read admin".into());
    let outcome = authorize(&harness, greedy).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_SCOPE);
}

// ============================================================================
// Code Exchange
// ============================================================================

#[tokio::test]
async fn test_code_exchange_issues_token_pair() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code", "refresh_token"]).await;
    let code = issue_code(&harness, &client).await;

    let outcome = redeem(&harness, exchange(&client, &code, Some(VERIFIER))).await;
    assert!(outcome.status(), "{outcome:?}");
    assert_eq!(payload_str(&outcome, "token_type"), "Bearer");
    assert_eq!(payload_str(&outcome, "scope"), "read");
    assert!(!payload_str(&outcome, "access_token").is_empty());
    assert!(!payload_str(&outcome, "refresh_token").is_empty());

    let access = harness
        .access_tokens(&RecordFilter::new().client(&client.client_id))
        .await;
    assert_eq!(access.len(), 1);
    assert_eq!(access[0].user_id.as_deref(), Some("user-42"));
    assert!(access[0].refresh_token_id.is_some());
}

#[tokio::test]
async fn test_code_is_single_use() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;

    assert!(redeem(&harness, exchange(&client, &code, Some(VERIFIER)))
        .await
        .status());
    let replay = redeem(&harness, exchange(&client, &code, Some(VERIFIER))).await;
    assert_eq!(failure_code(&replay), codes::oauth::INVALID_GRANT);
}

#[tokio::test]
async fn test_concurrent_redemption_yields_one_success() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;
    let kernel = token_kernel(&harness);

    let mut first_ctx = ExecutionContext::new();
    let mut second_ctx = ExecutionContext::new();
    let first_ray = ray();
    let second_ray = ray();
    let (first, second) = tokio::join!(
        kernel.execute(
            &mut first_ctx,
            first_ray.as_str(),
            exchange(&client, &code, Some(VERIFIER))
        ),
        kernel.execute(
            &mut second_ctx,
            second_ray.as_str(),
            exchange(&client, &code, Some(VERIFIER))
        ),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.status()).count(), 1);
    let loser = outcomes.iter().find(|o| !o.status()).unwrap();
    assert_eq!(failure_code(loser), codes::oauth::INVALID_GRANT);
    assert_eq!(
        harness
            .access_tokens(&RecordFilter::new().client(&client.client_id))
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_interrupted_commit_leaves_the_code_redeemable() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code", "refresh_token"]).await;
    let code = issue_code(&harness, &client).await;
    let filter = RecordFilter::new().client(&client.client_id);

    harness.storage.arm_commit_failure();
    let fault = token_kernel(&harness)
        .execute(
            &mut ExecutionContext::new(),
            ray().as_str(),
            exchange(&client, &code, Some(VERIFIER)),
        )
        .await
        .unwrap_err();
    assert_eq!(fault.code, FaultCode::StorageUnavailable);
    assert!(harness
        .events
        .snapshot()
        .contains(&"faulted:authorization_code:postconditions".to_owned()));
    assert!(harness.access_tokens(&filter).await.is_empty());
    assert!(harness.refresh_tokens(&filter).await.is_empty());

    let retry = redeem(&harness, exchange(&client, &code, Some(VERIFIER))).await;
    assert!(retry.status(), "{retry:?}");
    assert_eq!(harness.access_tokens(&filter).await.len(), 1);
}

#[tokio::test]
async fn test_blocked_issuance_does_not_consume_the_code() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;

    let blocked_deps = FlowDependencies::new(
        harness.storage.clone(),
        OAuth2Config {
            access_token_limit: TokenLimit::new(0, LimitScope::PerClient),
            ..fast_config()
        },
    )
    .unwrap()
    .with_clock(harness.clock.clone())
    .with_hasher(Arc::clone(&harness.deps.hasher));
    let blocked = OAuth2Authorization::new(AuthorizationCodeFlow::new(&blocked_deps), blocked_deps)
        .execute(
            &mut ExecutionContext::new(),
            ray().as_str(),
            exchange(&client, &code, Some(VERIFIER)),
        )
        .await
        .unwrap();
    assert_eq!(failure_code(&blocked), codes::oauth::UNAUTHORIZED_CLIENT);

    let retry = redeem(&harness, exchange(&client, &code, Some(VERIFIER))).await;
    assert!(retry.status(), "{retry:?}");
}

#[tokio::test]
async fn test_wrong_verifier_burns_the_code() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;

    let wrong = "x".repeat(43);
    let outcome = redeem(&harness, exchange(&client, &code, Some(&wrong))).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_GRANT);

    let retry = redeem(&harness, exchange(&client, &code, Some(VERIFIER))).await;
    assert_eq!(failure_code(&retry), codes::oauth::INVALID_GRANT);
}

#[tokio::test]
async fn test_missing_verifier_is_rejected() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;

    let outcome = redeem(&harness, exchange(&client, &code, None)).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_GRANT);
}

#[tokio::test]
async fn test_redirect_uri_must_match() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;

    let mut grant = exchange(&client, &code, Some(VERIFIER));
    grant.redirect_uri = Some("http://localhost:8080/other".into());
    let outcome = redeem(&harness, grant).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_GRANT);
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;

    harness.clock.advance(Duration::minutes(11));
    let outcome = redeem(&harness, exchange(&client, &code, Some(VERIFIER))).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_GRANT);
}

#[tokio::test]
async fn test_code_cannot_be_redeemed_by_another_client() {
    let harness = Harness::new();
    let owner = harness.public_client(&["authorization_code"]).await;
    let thief = harness.public_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &owner).await;

    let outcome = redeem(&harness, exchange(&thief, &code, Some(VERIFIER))).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_GRANT);
}

#[tokio::test]
async fn test_confidential_client_must_authenticate() {
    let harness = Harness::new();
    let client = harness.confidential_client(&["authorization_code"]).await;
    let code = issue_code(&harness, &client).await;

    let mut grant = exchange(&client, &code, Some(VERIFIER));
    grant.client = ClientCredentials::confidential(&client.client_id, "wrong");
    let outcome = redeem(&harness, grant).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_CLIENT);

    let outcome = redeem(&harness, exchange(&client, &code, Some(VERIFIER))).await;
    assert!(outcome.status(), "{outcome:?}");
}

#[tokio::test]
async fn test_missing_code_is_invalid_request() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;

    let mut grant = exchange(&client, "", Some(VERIFIER));
    grant.code = None;
    let outcome = redeem(&harness, grant).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_REQUEST);
    assert!(harness
        .events
        .snapshot()
        .iter()
        .any(|e| e.starts_with("failed:authorization_code:preconditions")));
}
