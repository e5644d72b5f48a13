// ABOUTME: Concrete OAuth 2.0 grant flows built on the OAuth2Authorization kernel
// ABOUTME: Each flow owns its pre-conditions, core logic, and post-conditions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Grant Flows
//!
//! | Flow | Grant | Yields |
//! |---|---|---|
//! | [`AuthorizeFlow`] | authorization request | authorization code |
//! | [`AuthorizationCodeFlow`] | `authorization_code` | access (+ refresh) token |
//! | [`ClientCredentialsFlow`] | `client_credentials` | access token |
//! | [`RefreshTokenFlow`] | `refresh_token` | access (+ rotated refresh) token |
//! | [`DeviceAuthorizationFlow`] | device authorization request | device + user code |
//! | [`DeviceCodeFlow`] | `device_code` | access (+ refresh) token |
//!
//! Build one with its dependencies and hand it to [`OAuth2Authorization`]:
//!
//! ```no_run
//! # async fn demo(deps: warden::flows::FlowDependencies) -> warden::AppResult<()> {
//! use warden::context::ExecutionContext;
//! use warden::flows::{ClientCredentials, OAuth2Authorization, RefreshTokenFlow, RefreshTokenGrant};
//!
//! let kernel = OAuth2Authorization::new(RefreshTokenFlow::new(&deps), deps.clone());
//! let outcome = kernel
//!     .execute(
//!         &mut ExecutionContext::new(),
//!         "ray-123",
//!         RefreshTokenGrant {
//!             client: ClientCredentials::public("my-client"),
//!             refresh_token: Some("opaque".into()),
//!             scope: None,
//!         },
//!     )
//!     .await?;
//! if outcome.status() { /* send outcome.client_message() */ }
//! # Ok(())
//! # }
//! ```

/// Authorization request handling (code issuance)
pub mod authorize;
/// `authorization_code` grant
pub mod authorization_code;
/// `client_credentials` grant
pub mod client_credentials;
/// Device authorization, user verification, and `device_code` grant
pub mod device;
/// Conditions shared in shape across flows (each flow builds its own instances)
pub mod guards;
/// Token minting, FIFO enforcement, persistence
pub mod issuance;
/// Flow lifecycle kernel
pub mod kernel;
/// PKCE challenge and verifier checks
pub mod pkce;
/// `refresh_token` grant
pub mod refresh_token;

pub use authorize::{AuthorizationRequest, AuthorizeFlow};
pub use authorization_code::{AuthorizationCodeFlow, AuthorizationCodeGrant};
pub use client_credentials::{ClientCredentialsFlow, ClientCredentialsGrant};
pub use device::{
    DeviceAuthorizationFlow, DeviceAuthorizationRequest, DeviceCodeFlow, DeviceCodeGrant,
    DeviceVerificationService,
};
pub use kernel::{
    FlowDependencies, FlowEvents, FlowPhase, GrantFlow, OAuth2Authorization, TracingFlowEvents,
};
pub use refresh_token::{RefreshTokenFlow, RefreshTokenGrant};

use std::fmt::{self, Debug, Formatter};

use warden_core::models::{ClientRecord, Scope};
use zeroize::Zeroizing;

/// Client identification presented on a token or device request
#[derive(Clone)]
pub struct ClientCredentials {
    /// Public client identifier
    pub client_id: String,
    /// Secret for confidential clients
    pub client_secret: Option<Zeroizing<String>>,
}

impl ClientCredentials {
    /// Confidential client presenting a secret
    pub fn confidential(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(Zeroizing::new(secret.into())),
        }
    }

    /// Public client without a secret
    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
        }
    }
}

impl Debug for ClientCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Flow parameters that identify a client
pub trait PresentsClient: Send + Sync + 'static {
    /// Credentials the caller presented
    fn client_credentials(&self) -> &ClientCredentials;
}

/// Flow parameters that carry a requested scope
pub trait RequestsScope: Send + Sync + 'static {
    /// Raw space-delimited scope, if any
    fn requested_scope(&self) -> Option<&str>;
}

/// Client established by a pre-condition (authenticated at the token endpoint,
/// looked up by id at the authorization endpoint)
#[derive(Debug, Clone)]
pub struct ResolvedClient(pub ClientRecord);

/// Scope granted after checking the request against the client
#[derive(Debug, Clone)]
pub struct GrantedScope(pub Scope);
