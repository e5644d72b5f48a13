// ABOUTME: Shared test utilities and fixtures for integration tests
// ABOUTME: Provides in-memory storage, manual clock, fast hashing, and client registration helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
//! Shared test utilities for `warden`
//!
//! Every harness owns its own [`InMemoryStorage`] and [`ManualClock`], so
//! tests never share state.

use std::sync::{Arc, Mutex, Once};

use chrono::{DateTime, Duration, TimeZone, Utc};
use warden::clock::{Clock, ManualClock};
use warden::config::{Argon2Settings, OAuth2Config};
use warden::credentials::{Argon2CredentialHasher, SecretRotationService};
use warden::context::ExecutionContext;
use warden::flows::{
    pkce, AuthorizationCodeFlow, AuthorizationCodeGrant, AuthorizationRequest, AuthorizeFlow,
    ClientCredentials, FlowDependencies, FlowEvents, FlowPhase, OAuth2Authorization,
};
use warden::models::{AccessToken, AuditRecord, ClientType, RefreshToken};
use warden::registration::{ClientRegistrationManager, ClientRegistrationRequest};
use warden::storage::{InMemoryStorage, RecordFilter, StorageBackend};
use warden::{AppError, ErrorCode, Outcome, RayId};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Cheap Argon2 parameters so tests do not spend seconds hashing
pub const FAST_ARGON2: Argon2Settings = Argon2Settings {
    memory_kib: 64,
    iterations: 1,
    parallelism: 1,
};

/// Default configuration with fast hashing
pub fn fast_config() -> OAuth2Config {
    OAuth2Config {
        argon2: FAST_ARGON2,
        ..OAuth2Config::default()
    }
}

/// Fixed starting instant for manual clocks
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

/// Fresh ray id
pub fn ray() -> RayId {
    RayId::generate()
}

/// Lifecycle events captured as strings such as `started:refresh_token`
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl FlowEvents for RecordingEvents {
    fn flow_started(&self, flow: &'static str, ray_id: &RayId) {
        self.push(format!("started:{flow}:{ray_id}"));
    }

    fn flow_failed(&self, flow: &'static str, phase: FlowPhase, _ray_id: &RayId, code: ErrorCode) {
        self.push(format!("failed:{flow}:{phase}:{code}"));
    }

    fn flow_faulted(&self, flow: &'static str, phase: FlowPhase, _ray_id: &RayId, _fault: &AppError) {
        self.push(format!("faulted:{flow}:{phase}"));
    }

    fn flow_completed(&self, flow: &'static str, _ray_id: &RayId, _elapsed: Duration) {
        self.push(format!("completed:{flow}"));
    }
}

/// A registered client as the tests see it
#[derive(Debug, Clone)]
pub struct TestClient {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub owner_id: String,
}

/// Storage, clock, and dependencies wired together
pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingEvents>,
    pub deps: FlowDependencies,
    pub registrar: ClientRegistrationManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: OAuth2Config) -> Self {
        init_test_logging();
        let storage = Arc::new(InMemoryStorage::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let events = Arc::new(RecordingEvents::default());
        let hasher = Arc::new(Argon2CredentialHasher::new(config.argon2).unwrap());

        let deps = FlowDependencies::new(storage.clone(), config)
            .unwrap()
            .with_clock(clock.clone())
            .with_events(events.clone())
            .with_hasher(hasher);
        let registrar = ClientRegistrationManager::from_dependencies(&deps);

        Self {
            storage,
            clock,
            events,
            deps,
            registrar,
        }
    }

    /// Rotation service sharing this harness's dependencies
    pub fn rotation(&self) -> SecretRotationService {
        SecretRotationService::from_dependencies(&self.deps)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a client or fail the test
    pub async fn register(&self, request: ClientRegistrationRequest) -> TestClient {
        let owner_id = request.owner_id.clone();
        let outcome = self
            .registrar
            .materialize(request, "test-admin", &ray())
            .await
            .unwrap();
        let Outcome::Success(success) = outcome else {
            panic!("registration failed: {outcome:?}");
        };
        let payload = success.client_message();
        TestClient {
            client_id: payload["client_id"].as_str().unwrap().to_owned(),
            client_secret: payload["client_secret"].as_str().map(str::to_owned),
            owner_id,
        }
    }

    /// Confidential client registered for `grants` with scope `read write`
    pub async fn confidential_client(&self, grants: &[&str]) -> TestClient {
        self.register(registration_request(ClientType::Confidential, grants))
            .await
    }

    /// Public client registered for `grants` with scope `read write`
    pub async fn public_client(&self, grants: &[&str]) -> TestClient {
        self.register(registration_request(ClientType::Public, grants))
            .await
    }

    pub async fn access_tokens(&self, filter: &RecordFilter) -> Vec<AccessToken> {
        let mut tx = self.storage.begin().await.unwrap();
        tx.access_tokens().list(filter).await.unwrap()
    }

    pub async fn refresh_tokens(&self, filter: &RecordFilter) -> Vec<RefreshToken> {
        let mut tx = self.storage.begin().await.unwrap();
        tx.refresh_tokens().list(filter).await.unwrap()
    }

    pub async fn audit_for(&self, ray_id: &RayId) -> Vec<AuditRecord> {
        let mut tx = self.storage.begin().await.unwrap();
        tx.audit_log().list_by_ray_id(ray_id.as_str()).await.unwrap()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Redirect URI every test client registers
pub const REDIRECT_URI: &str = "http://localhost:8080/callback";

/// PKCE verifier used by [`Harness::user_tokens`]
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

impl Harness {
    /// Run authorize then code exchange for `user_id` and return the token response
    pub async fn user_tokens(&self, client: &TestClient, user_id: &str) -> Outcome {
        let authorized = OAuth2Authorization::new(AuthorizeFlow::new(&self.deps), self.deps.clone())
            .execute(
                &mut ExecutionContext::new(),
                ray().as_str(),
                AuthorizationRequest {
                    response_type: "code".to_owned(),
                    client_id: client.client_id.clone(),
                    redirect_uri: REDIRECT_URI.to_owned(),
                    scope: None,
                    state: None,
                    code_challenge: Some(pkce::s256_challenge(VERIFIER)),
                    code_challenge_method: Some("S256".to_owned()),
                    user_id: user_id.to_owned(),
                },
            )
            .await
            .unwrap();
        let code = payload_str(&authorized, "code");

        OAuth2Authorization::new(AuthorizationCodeFlow::new(&self.deps), self.deps.clone())
            .execute(
                &mut ExecutionContext::new(),
                ray().as_str(),
                AuthorizationCodeGrant {
                    client: client.credentials(),
                    code: Some(code),
                    redirect_uri: Some(REDIRECT_URI.to_owned()),
                    code_verifier: Some(VERIFIER.to_owned()),
                },
            )
            .await
            .unwrap()
    }
}

impl TestClient {
    /// Credentials as the client would present them
    pub fn credentials(&self) -> ClientCredentials {
        match &self.client_secret {
            Some(secret) => ClientCredentials::confidential(&self.client_id, secret),
            None => ClientCredentials::public(&self.client_id),
        }
    }
}

/// Registration request with a loopback redirect URI and scope `read write`
pub fn registration_request(client_type: ClientType, grants: &[&str]) -> ClientRegistrationRequest {
    ClientRegistrationRequest {
        owner_id: "owner-1".to_owned(),
        client_type,
        client_name: Some("test client".to_owned()),
        redirect_uris: vec![REDIRECT_URI.to_owned()],
        grant_types: Some(grants.iter().map(|g| (*g).to_owned()).collect()),
        response_types: None,
        scope: Some("read write".to_owned()),
        expires_at: None,
    }
}

/// Error code of a failed outcome, panicking on success
pub fn failure_code(outcome: &Outcome) -> ErrorCode {
    outcome
        .error_code()
        .unwrap_or_else(|| panic!("expected failure, got {outcome:?}"))
}

/// String field from a success payload
pub fn payload_str(outcome: &Outcome, field: &str) -> String {
    assert!(outcome.status(), "expected success, got {outcome:?}");
    outcome.client_message()[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing {field} in {:?}", outcome.client_message()))
        .to_owned()
}
