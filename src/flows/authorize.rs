// ABOUTME: Authorization request flow issuing single-use codes bound to redirect URI and PKCE
// ABOUTME: Runs after the embedder has authenticated the user and recorded consent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;
use warden_core::errors::{codes, AppResult};
use warden_core::models::{AuditStamp, AuthorizationCode, GrantType, PkceMethod};
use warden_core::outcome::{Outcome, RayId};

use super::guards::{GrantEnabled, ScopeWithinClient};
use super::kernel::{FlowDependencies, GrantFlow};
use super::pkce;
use super::{GrantedScope, RequestsScope, ResolvedClient};
use crate::audit::{AppendAudit, AuditEntry};
use crate::clock::Clock;
use crate::conditions::{Condition, ConditionChain};
use crate::config::OAuth2Config;
use crate::constants::{events, secrets};
use crate::context::ExecutionContext;
use crate::credentials::random_token;
use crate::storage::{secret_digest, StorageBackend};

/// Approved authorization request (RFC 6749 §4.1.1)
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Must be `code`
    pub response_type: String,
    /// Requesting client
    pub client_id: String,
    /// Where the code will be delivered; must be registered exactly
    pub redirect_uri: String,
    /// Requested scope
    pub scope: Option<String>,
    /// Opaque client state echoed back
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE method; only `S256`
    pub code_challenge_method: Option<String>,
    /// User who approved the request
    pub user_id: String,
}

impl RequestsScope for AuthorizationRequest {
    fn requested_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// Code generated by the run phase, awaiting persistence
#[derive(Debug, Clone)]
pub struct PendingAuthorizationCode(pub AuthorizationCode);

struct ResponseTypeIsCode;

#[async_trait]
impl Condition for ResponseTypeIsCode {
    fn name(&self) -> &'static str {
        "response_type_is_code"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let request = ctx.require::<AuthorizationRequest>()?;
        if request.response_type == "code" {
            return Ok(Outcome::empty_success(ray_id));
        }
        Ok(Outcome::failed(
            codes::oauth::UNSUPPORTED_RESPONSE_TYPE,
            format!("unsupported response_type: {}", request.response_type),
            ray_id,
        ))
    }
}

/// Looks the client up by id; there is no client authentication at this endpoint
struct ResolveRequestingClient {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Condition for ResolveRequestingClient {
    fn name(&self) -> &'static str {
        "resolve_requesting_client"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let client_id = ctx.require::<AuthorizationRequest>()?.client_id.clone();
        let stored = {
            let mut tx = self.storage.begin().await?;
            tx.clients().get_by_natural_key(&client_id).await?
        };
        let now = self.clock.now();
        let Some(client) = stored.filter(|c| c.enabled && !c.is_expired(now)) else {
            return Ok(Outcome::failed(
                codes::oauth::INVALID_CLIENT,
                "unknown client",
                ray_id,
            ));
        };
        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Ok(Outcome::failed(
                codes::oauth::UNAUTHORIZED_CLIENT,
                "client is not registered for authorization_code",
                ray_id,
            ));
        }
        ctx.provide(ResolvedClient(client))?;
        Ok(Outcome::empty_success(ray_id))
    }
}

struct RedirectUriRegistered;

#[async_trait]
impl Condition for RedirectUriRegistered {
    fn name(&self) -> &'static str {
        "redirect_uri_registered"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let redirect_uri = &ctx.require::<AuthorizationRequest>()?.redirect_uri;
        let client = &ctx.require::<ResolvedClient>()?.0;
        if client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            return Ok(Outcome::empty_success(ray_id));
        }
        Ok(Outcome::failed(
            codes::oauth::INVALID_REQUEST,
            "redirect_uri is not registered for this client",
            ray_id,
        ))
    }
}

/// Challenge required when configured or for public clients; S256 only
struct PkceChallengeValid {
    require_pkce: bool,
}

#[async_trait]
impl Condition for PkceChallengeValid {
    fn name(&self) -> &'static str {
        "pkce_challenge_valid"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let request = ctx.require::<AuthorizationRequest>()?;
        let client = &ctx.require::<ResolvedClient>()?.0;

        let Some(challenge) = request.code_challenge.as_deref() else {
            if self.require_pkce || !client.is_confidential() {
                return Ok(Outcome::failed(
                    codes::oauth::INVALID_REQUEST,
                    "code_challenge is required",
                    ray_id,
                ));
            }
            return Ok(Outcome::empty_success(ray_id));
        };

        if PkceMethod::parse(request.code_challenge_method.as_deref()).is_none() {
            return Ok(Outcome::failed(
                codes::oauth::INVALID_REQUEST,
                "only the S256 code_challenge_method is supported",
                ray_id,
            ));
        }
        if let Err(rejection) = pkce::check_format(challenge) {
            return Ok(Outcome::failed(
                codes::oauth::INVALID_REQUEST,
                rejection.message(),
                ray_id,
            ));
        }
        Ok(Outcome::empty_success(ray_id))
    }
}

struct PersistAuthorizationCode {
    storage: Arc<dyn StorageBackend>,
}

#[async_trait]
impl Condition for PersistAuthorizationCode {
    fn name(&self) -> &'static str {
        "persist_authorization_code"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let code = ctx.require::<PendingAuthorizationCode>()?.0.clone();
        let mut tx = self.storage.begin().await?;
        tx.authorization_codes().insert(code).await?;
        tx.commit().await?;
        Ok(Outcome::empty_success(ray_id))
    }
}

fn describe_code_issued(ctx: &ExecutionContext) -> AppResult<AuditEntry> {
    let code = &ctx.require::<PendingAuthorizationCode>()?.0;
    Ok(AuditEntry::new(events::CODE_ISSUED, &code.user_id)
        .client(&code.client_id)
        .user(&code.user_id)
        .detail("code_id", code.id.to_string())
        .detail("scope", code.scope.to_string())
        .detail("pkce", code.code_challenge.is_some()))
}

/// Authorization endpoint logic: validates the request and issues a code
pub struct AuthorizeFlow {
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
    preconditions: ConditionChain,
    postconditions: ConditionChain,
}

impl AuthorizeFlow {
    /// Build the flow's condition chains
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        let preconditions = ConditionChain::new("authorize.pre")
            .with(GrantEnabled::new(deps, GrantType::AuthorizationCode))
            .with(ResponseTypeIsCode)
            .with(ResolveRequestingClient {
                storage: Arc::clone(&deps.storage),
                clock: Arc::clone(&deps.clock),
            })
            .with(RedirectUriRegistered)
            .with(PkceChallengeValid {
                require_pkce: deps.config.require_pkce,
            })
            .with(ScopeWithinClient::<AuthorizationRequest>::new());

        let postconditions = ConditionChain::new("authorize.post")
            .with(PersistAuthorizationCode {
                storage: Arc::clone(&deps.storage),
            })
            .with(AppendAudit::new(deps.audit_trail(), describe_code_issued));

        Self {
            config: Arc::clone(&deps.config),
            clock: Arc::clone(&deps.clock),
            preconditions,
            postconditions,
        }
    }
}

#[async_trait]
impl GrantFlow for AuthorizeFlow {
    type Params = AuthorizationRequest;

    fn name(&self) -> &'static str {
        "authorize"
    }

    fn preconditions(&self) -> &ConditionChain {
        &self.preconditions
    }

    async fn run(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let request = ctx.require::<AuthorizationRequest>()?.clone();
        let scope = ctx.require::<GrantedScope>()?.0.clone();
        let now = self.clock.now();
        let raw_code = random_token(secrets::TOKEN_BYTES)?;

        let code = AuthorizationCode {
            id: Uuid::new_v4(),
            code_digest: secret_digest(&raw_code),
            client_id: request.client_id.clone(),
            user_id: request.user_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope,
            state: request.state.clone(),
            code_challenge_method: request
                .code_challenge
                .as_ref()
                .and_then(|_| PkceMethod::parse(request.code_challenge_method.as_deref())),
            code_challenge: request.code_challenge,
            expires_at: self.config.authorization_code_expiry(now)?,
            consumed_at: None,
            stamp: AuditStamp::new(now, request.user_id.as_str()),
        };
        ctx.provide(PendingAuthorizationCode(code))?;

        Ok(Outcome::success(
            json!({
                "code": raw_code,
                "state": request.state,
                "redirect_uri": request.redirect_uri,
                "expires_in": self.config.authorization_code_ttl_secs,
            }),
            ray_id,
        ))
    }

    fn postconditions(&self) -> &ConditionChain {
        &self.postconditions
    }
}
