// ABOUTME: Integration tests for the client_credentials grant
// ABOUTME: Covers confidential-only access, authentication failures, scope checks, and grant gating
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use warden::codes;
use warden::config::OAuth2Config;
use warden::constants::events;
use warden::context::ExecutionContext;
use warden::flows::{
    ClientCredentials, ClientCredentialsFlow, ClientCredentialsGrant, OAuth2Authorization,
};
use warden::models::{ClientType, GrantType};
use warden::storage::RecordFilter;
use warden::{Outcome, RayId};

use common::{failure_code, fast_config, payload_str, ray, registration_request, Harness};

async fn request(harness: &Harness, client: ClientCredentials, scope: Option<&str>) -> Outcome {
    request_with_ray(harness, client, scope, &ray()).await
}

async fn request_with_ray(
    harness: &Harness,
    client: ClientCredentials,
    scope: Option<&str>,
    ray_id: &RayId,
) -> Outcome {
    OAuth2Authorization::new(ClientCredentialsFlow::new(&harness.deps), harness.deps.clone())
        .execute(
            &mut ExecutionContext::new(),
            ray_id.as_str(),
            ClientCredentialsGrant {
                client,
                scope: scope.map(str::to_owned),
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_confidential_client_receives_access_token_only() {
    let harness = Harness::new();
    let client = harness.confidential_client(&["client_credentials"]).await;
    let ray_id = ray();

    let outcome = request_with_ray(&harness, client.credentials(), Some("read"), &ray_id).await;
    assert_eq!(outcome.ray_id(), &ray_id);
    assert_eq!(payload_str(&outcome, "scope"), "read");
    assert_eq!(outcome.client_message()["expires_in"], 3600);
    assert!(outcome.client_message().get("refresh_token").is_none());

    let tokens = harness
        .access_tokens(&RecordFilter::new().client(&client.client_id))
        .await;
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].user_id.is_none());
    assert!(tokens[0].refresh_token_id.is_none());

    let audit = harness.audit_for(&ray_id).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event, events::TOKEN_ISSUED);
    assert_eq!(
        harness.events.snapshot(),
        vec![
            format!("started:client_credentials:{ray_id}"),
            "completed:client_credentials".to_owned(),
        ]
    );
}

#[tokio::test]
async fn test_public_clients_are_refused() {
    let harness = Harness::new();
    let client = harness.public_client(&["authorization_code"]).await;

    let outcome = request(&harness, ClientCredentials::public(&client.client_id), None).await;
    assert_eq!(failure_code(&outcome), codes::oauth::UNAUTHORIZED_CLIENT);
}

#[tokio::test]
async fn test_authentication_failures_are_invalid_client() {
    let harness = Harness::new();
    let client = harness.confidential_client(&["client_credentials"]).await;

    let wrong_secret = request(
        &harness,
        ClientCredentials::confidential(&client.client_id, "guess"),
        None,
    )
    .await;
    assert_eq!(failure_code(&wrong_secret), codes::oauth::INVALID_CLIENT);

    let no_secret = request(&harness, ClientCredentials::public(&client.client_id), None).await;
    assert_eq!(failure_code(&no_secret), codes::oauth::INVALID_CLIENT);

    let unknown = request(
        &harness,
        ClientCredentials::confidential("wdn_unknown", "secret"),
        None,
    )
    .await;
    assert_eq!(failure_code(&unknown), codes::oauth::INVALID_CLIENT);
}

#[tokio::test]
async fn test_expired_client_is_invalid_client() {
    let harness = Harness::new();
    let mut registration = registration_request(ClientType::Confidential, &["client_credentials"]);
    registration.expires_at = Some(harness.now() + chrono::Duration::hours(1));
    let client = harness.register(registration).await;

    assert!(request(&harness, client.credentials(), None).await.status());
    harness.clock.advance(chrono::Duration::hours(2));
    let outcome = request(&harness, client.credentials(), None).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_CLIENT);
}

#[tokio::test]
async fn test_scope_outside_registration_is_invalid_scope() {
    let harness = Harness::new();
    let client = harness.confidential_client(&["client_credentials"]).await;

    let outcome = request(&harness, client.credentials(), Some("read admin")).await;
    assert_eq!(failure_code(&outcome), codes::oauth::INVALID_SCOPE);
}

#[tokio::test]
async fn test_client_not_registered_for_grant_is_unauthorized() {
    let harness = Harness::new();
    let client = harness.confidential_client(&["authorization_code"]).await;

    let outcome = request(&harness, client.credentials(), None).await;
    assert_eq!(failure_code(&outcome), codes::oauth::UNAUTHORIZED_CLIENT);
}

#[tokio::test]
async fn test_disabled_grant_is_unsupported() {
    let harness = Harness::with_config(OAuth2Config {
        enabled_grants: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        ..fast_config()
    });
    let client = harness.confidential_client(&["client_credentials"]).await;

    let outcome = request(&harness, client.credentials(), None).await;
    assert_eq!(failure_code(&outcome), codes::oauth::UNSUPPORTED_GRANT_TYPE);
    assert!(harness
        .events
        .snapshot()
        .iter()
        .any(|e| e == "failed:client_credentials:preconditions:oauth.unsupported_grant_type"));
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_the_grant() {
    let harness = Harness::new();
    let client = harness.confidential_client(&["client_credentials"]).await;
    let ray_id = ray();

    harness.storage.arm_audit_failure();
    let outcome = request_with_ray(&harness, client.credentials(), None, &ray_id).await;
    assert!(outcome.status(), "{outcome:?}");
    assert!(harness
        .events
        .snapshot()
        .contains(&"completed:client_credentials".to_owned()));

    let tokens = harness
        .access_tokens(&RecordFilter::new().client(&client.client_id))
        .await;
    assert_eq!(tokens.len(), 1);
    assert!(harness.audit_for(&ray_id).await.is_empty());
}
