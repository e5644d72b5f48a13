// ABOUTME: Condition building blocks flows instantiate with their own grant-specific settings
// ABOUTME: Grant enablement, parameter presence, client authentication, scope, limits, persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use warden_core::errors::{codes, AppResult};
use warden_core::models::{GrantType, Scope};
use warden_core::outcome::{Outcome, RayId};

use super::issuance::{persist_issued_tokens, IssuedTokens};
use super::kernel::FlowDependencies;
use super::{GrantedScope, PresentsClient, RequestsScope, ResolvedClient};
use crate::clock::Clock;
use crate::conditions::Condition;
use crate::config::{OAuth2Config, TokenLimit};
use crate::context::ExecutionContext;
use crate::credentials::{verify_off_thread, CredentialHasher};
use crate::storage::StorageBackend;

/// Fails with `oauth.unsupported_grant_type` unless the grant is enabled
pub struct GrantEnabled {
    config: Arc<OAuth2Config>,
    grant: GrantType,
}

impl GrantEnabled {
    /// Gate for `grant`
    #[must_use]
    pub fn new(deps: &FlowDependencies, grant: GrantType) -> Self {
        Self {
            config: Arc::clone(&deps.config),
            grant,
        }
    }
}

#[async_trait]
impl Condition for GrantEnabled {
    fn name(&self) -> &'static str {
        "grant_enabled"
    }

    async fn validate(&self, _ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        if self.config.grant_enabled(self.grant) {
            Ok(Outcome::empty_success(ray_id))
        } else {
            Ok(Outcome::failed(
                codes::oauth::UNSUPPORTED_GRANT_TYPE,
                format!("grant type {} is not enabled", self.grant),
                ray_id,
            ))
        }
    }
}

/// Fails with `oauth.invalid_request` when a required parameter is absent
pub struct RequirePresent<P> {
    parameter: &'static str,
    present: fn(&P) -> bool,
}

impl<P: Send + Sync + 'static> RequirePresent<P> {
    /// Check `parameter` with `present`
    #[must_use]
    pub fn new(parameter: &'static str, present: fn(&P) -> bool) -> Self {
        Self { parameter, present }
    }
}

#[async_trait]
impl<P: Send + Sync + 'static> Condition for RequirePresent<P> {
    fn name(&self) -> &'static str {
        "require_present"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        if (self.present)(ctx.require::<P>()?) {
            Ok(Outcome::empty_success(ray_id))
        } else {
            Ok(Outcome::failed(
                codes::oauth::INVALID_REQUEST,
                format!("missing required parameter: {}", self.parameter),
                ray_id,
            ))
        }
    }
}

/// `true` for `Some` non-blank strings
#[must_use]
pub fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Resolves and authenticates the presenting client for one grant
///
/// Unknown, disabled, or expired clients and bad secrets all fail with
/// `oauth.invalid_client`. A client not registered for the grant fails with
/// `oauth.unauthorized_client`. On success provides [`ResolvedClient`].
pub struct AuthenticateClient<P> {
    storage: Arc<dyn StorageBackend>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    grant: GrantType,
    confidential_only: bool,
    params: PhantomData<fn() -> P>,
}

impl<P: PresentsClient> AuthenticateClient<P> {
    /// Authenticate clients for `grant`
    #[must_use]
    pub fn new(deps: &FlowDependencies, grant: GrantType) -> Self {
        Self {
            storage: Arc::clone(&deps.storage),
            hasher: Arc::clone(&deps.hasher),
            clock: Arc::clone(&deps.clock),
            grant,
            confidential_only: false,
            params: PhantomData,
        }
    }

    /// Reject public clients with `oauth.unauthorized_client`
    #[must_use]
    pub fn confidential_only(mut self) -> Self {
        self.confidential_only = true;
        self
    }
}

#[async_trait]
impl<P: PresentsClient> Condition for AuthenticateClient<P> {
    fn name(&self) -> &'static str {
        "authenticate_client"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let presented = ctx.require::<P>()?.client_credentials().clone();
        let stored = {
            let mut tx = self.storage.begin().await?;
            tx.clients().get_by_natural_key(&presented.client_id).await?
        };

        let now = self.clock.now();
        let Some(client) = stored.filter(|c| c.enabled && !c.is_expired(now)) else {
            warn!(ray_id = %ray_id, client_id = %presented.client_id, "unknown, disabled, or expired client");
            return Ok(invalid_client(ray_id));
        };

        if client.is_confidential() {
            let (Some(secret), Some(stored_hash)) =
                (presented.client_secret, client.client_secret_hash.clone())
            else {
                return Ok(invalid_client(ray_id));
            };
            let verified = verify_off_thread(
                Arc::clone(&self.hasher),
                secret,
                stored_hash,
                client.owner_id.clone(),
                client.client_id.clone(),
            )
            .await?;
            if !verified {
                warn!(ray_id = %ray_id, client_id = %client.client_id, "client secret mismatch");
                return Ok(invalid_client(ray_id));
            }
        } else if presented.client_secret.is_some() {
            return Ok(invalid_client(ray_id));
        } else if self.confidential_only {
            return Ok(Outcome::failed(
                codes::oauth::UNAUTHORIZED_CLIENT,
                format!("public clients cannot use {}", self.grant),
                ray_id,
            ));
        }

        if !client.allows_grant(self.grant) {
            return Ok(Outcome::failed(
                codes::oauth::UNAUTHORIZED_CLIENT,
                format!("client is not registered for {}", self.grant),
                ray_id,
            ));
        }

        debug!(ray_id = %ray_id, client_id = %client.client_id, grant = %self.grant, "client authenticated");
        ctx.provide(ResolvedClient(client))?;
        Ok(Outcome::empty_success(ray_id))
    }
}

fn invalid_client(ray_id: &RayId) -> Outcome {
    Outcome::failed(
        codes::oauth::INVALID_CLIENT,
        "client authentication failed",
        ray_id,
    )
}

/// Requested scope must be within the client's registered scope
///
/// An empty request is granted the client's full registered scope. Provides
/// [`GrantedScope`].
pub struct ScopeWithinClient<P> {
    params: PhantomData<fn() -> P>,
}

impl<P: RequestsScope> ScopeWithinClient<P> {
    /// Scope gate reading the request from `P`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            params: PhantomData,
        }
    }
}

impl<P: RequestsScope> Default for ScopeWithinClient<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: RequestsScope> Condition for ScopeWithinClient<P> {
    fn name(&self) -> &'static str {
        "scope_within_client"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let requested = Scope::parse(ctx.require::<P>()?.requested_scope());
        let registered = &ctx.require::<ResolvedClient>()?.0.scope;

        let granted = if requested.is_empty() {
            registered.clone()
        } else if requested.is_subset_of(registered) {
            requested
        } else {
            return Ok(Outcome::failed(
                codes::oauth::INVALID_SCOPE,
                format!(
                    "scope not registered for client: {}",
                    requested.excess_over(registered).join(" ")
                ),
                ray_id,
            ));
        };

        ctx.provide(GrantedScope(granted))?;
        Ok(Outcome::empty_success(ray_id))
    }
}

/// Fails with `oauth.unauthorized_client` when a token kind's limit is zero
pub struct CheckTokenLimit {
    limit: TokenLimit,
    kind: &'static str,
}

impl CheckTokenLimit {
    /// Gate on the access token limit
    #[must_use]
    pub fn access_tokens(deps: &FlowDependencies) -> Self {
        Self {
            limit: deps.config.access_token_limit,
            kind: "access token",
        }
    }
}

#[async_trait]
impl Condition for CheckTokenLimit {
    fn name(&self) -> &'static str {
        "check_token_limit"
    }

    async fn validate(&self, _ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        if self.limit.blocks_issuance() {
            return Ok(Outcome::failed(
                codes::oauth::UNAUTHORIZED_CLIENT,
                format!("{} issuance is disabled", self.kind),
                ray_id,
            ));
        }
        Ok(Outcome::empty_success(ray_id))
    }
}

/// Persists [`IssuedTokens`] with FIFO enforcement in one transaction
pub struct PersistIssuedTokens {
    storage: Arc<dyn StorageBackend>,
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
}

impl PersistIssuedTokens {
    /// Persistence step over the flow's storage
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        Self {
            storage: Arc::clone(&deps.storage),
            config: Arc::clone(&deps.config),
            clock: Arc::clone(&deps.clock),
        }
    }
}

#[async_trait]
impl Condition for PersistIssuedTokens {
    fn name(&self) -> &'static str {
        "persist_issued_tokens"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let tokens = ctx.require::<IssuedTokens>()?;
        let mut tx = self.storage.begin().await?;
        persist_issued_tokens(tx.as_mut(), &self.config, tokens, self.clock.now()).await?;
        tx.commit().await?;
        Ok(Outcome::empty_success(ray_id))
    }
}
