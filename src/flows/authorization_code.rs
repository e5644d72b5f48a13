// ABOUTME: authorization_code grant redeeming a single-use code for an access and refresh token
// ABOUTME: The code is consumed in the transaction that persists its tokens, so it is redeemed once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use warden_core::errors::{codes, AppResult};
use warden_core::models::{AuthorizationCode, GrantType};
use warden_core::outcome::{Outcome, RayId};

use super::guards::{non_blank, AuthenticateClient, CheckTokenLimit, GrantEnabled, RequirePresent};
use super::issuance::{mint_token_pair, persist_issued_tokens, IssuedTokens};
use super::kernel::{FlowDependencies, GrantFlow};
use super::pkce;
use super::{ClientCredentials, PresentsClient, ResolvedClient};
use crate::audit::{AppendAudit, AuditEntry};
use crate::clock::Clock;
use crate::conditions::{Condition, ConditionChain};
use crate::config::OAuth2Config;
use crate::constants::events;
use crate::context::ExecutionContext;
use crate::storage::{secret_digest, StorageBackend};

/// Token request for the `authorization_code` grant (RFC 6749 §4.1.3)
#[derive(Debug, Clone)]
pub struct AuthorizationCodeGrant {
    /// Presenting client
    pub client: ClientCredentials,
    /// Code received on the redirect
    pub code: Option<String>,
    /// Must equal the redirect URI the code was issued for
    pub redirect_uri: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
}

impl PresentsClient for AuthorizationCodeGrant {
    fn client_credentials(&self) -> &ClientCredentials {
        &self.client
    }
}

/// Code presented by this request, as read during pre-conditions
#[derive(Debug, Clone)]
pub struct RedeemedCode(pub AuthorizationCode);

/// Checks the code's bindings and PKCE without consuming it
///
/// A wrong or missing verifier burns the code in its own transaction. A code
/// that passes is consumed later, together with the tokens it yields.
struct InspectAuthorizationCode {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

fn binding_failure(
    code: &AuthorizationCode,
    grant: &AuthorizationCodeGrant,
    client_id: &str,
    now: DateTime<Utc>,
) -> Option<&'static str> {
    if code.client_id != client_id {
        Some("code was issued to another client")
    } else if code.consumed_at.is_some() {
        Some("code already used")
    } else if !code.is_redeemable(now) {
        Some("code expired")
    } else if grant.redirect_uri.as_deref() != Some(code.redirect_uri.as_str()) {
        Some("redirect_uri does not match")
    } else {
        None
    }
}

fn pkce_failure(code: &AuthorizationCode, verifier: Option<&str>) -> Option<&'static str> {
    match (code.code_challenge.as_deref(), verifier) {
        (Some(challenge), Some(verifier)) => pkce::check_format(verifier)
            .and_then(|()| pkce::verify_s256(verifier, challenge))
            .err()
            .map(|rejection| rejection.message()),
        (Some(_), None) => Some("code_verifier is required"),
        (None, Some(_)) => Some("code_verifier sent for a code issued without a challenge"),
        (None, None) => None,
    }
}

impl InspectAuthorizationCode {
    async fn burn(
        &self,
        code: &AuthorizationCode,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tx = self.storage.begin().await?;
        if let Some(mut stored) = tx
            .authorization_codes()
            .get(code.id)
            .await?
            .filter(|c| c.consumed_at.is_none())
        {
            stored.consumed_at = Some(now);
            stored.stamp.touch(now, actor);
            tx.authorization_codes().update(stored).await?;
            tx.commit().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Condition for InspectAuthorizationCode {
    fn name(&self) -> &'static str {
        "inspect_authorization_code"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let grant = ctx.require::<AuthorizationCodeGrant>()?.clone();
        let client_id = ctx.require::<ResolvedClient>()?.0.client_id.clone();
        let digest = secret_digest(grant.code.as_deref().unwrap_or_default());
        let now = self.clock.now();

        let stored = {
            let mut tx = self.storage.begin().await?;
            tx.authorization_codes().get_by_natural_key(&digest).await?
        };
        let Some(code) = stored else {
            return Ok(invalid_grant("unknown authorization code", ray_id));
        };
        if let Some(reason) = binding_failure(&code, &grant, &client_id, now) {
            warn!(ray_id = %ray_id, client_id = %client_id, reason, "authorization code rejected");
            return Ok(invalid_grant(reason, ray_id));
        }
        if let Some(reason) = pkce_failure(&code, grant.code_verifier.as_deref()) {
            warn!(ray_id = %ray_id, client_id = %client_id, reason, "pkce check failed; burning code");
            self.burn(&code, &client_id, now).await?;
            return Ok(invalid_grant(reason, ray_id));
        }

        ctx.provide(RedeemedCode(code))?;
        Ok(Outcome::empty_success(ray_id))
    }
}

/// Consumes the code and persists the issued tokens in one transaction
///
/// The code is re-read inside the transaction, so of two concurrent
/// exchanges only the first to commit succeeds. A failed commit leaves the
/// code redeemable.
struct RedeemCodeForTokens {
    storage: Arc<dyn StorageBackend>,
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Condition for RedeemCodeForTokens {
    fn name(&self) -> &'static str {
        "redeem_code_for_tokens"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let code_id = ctx.require::<RedeemedCode>()?.0.id;
        let tokens = ctx.require::<IssuedTokens>()?;
        let now = self.clock.now();

        let mut tx = self.storage.begin().await?;
        let Some(mut code) = tx
            .authorization_codes()
            .get(code_id)
            .await?
            .filter(|c| c.is_redeemable(now))
        else {
            warn!(ray_id = %ray_id, code_id = %code_id, "authorization code redeemed concurrently");
            return Ok(invalid_grant("code already used", ray_id));
        };

        let actor = code.client_id.clone();
        code.consumed_at = Some(now);
        code.stamp.touch(now, actor.as_str());
        tx.authorization_codes().update(code).await?;
        persist_issued_tokens(tx.as_mut(), &self.config, tokens, now).await?;
        tx.commit().await?;
        Ok(Outcome::empty_success(ray_id))
    }
}

fn invalid_grant(message: &str, ray_id: &RayId) -> Outcome {
    Outcome::failed(codes::oauth::INVALID_GRANT, message, ray_id)
}

fn describe_token_issued(ctx: &ExecutionContext) -> AppResult<AuditEntry> {
    let code = &ctx.require::<RedeemedCode>()?.0;
    let tokens = ctx.require::<IssuedTokens>()?;
    Ok(AuditEntry::new(events::TOKEN_ISSUED, &code.client_id)
        .client(&code.client_id)
        .user(&code.user_id)
        .detail("grant_type", GrantType::AuthorizationCode.as_str())
        .detail("code_id", code.id.to_string())
        .detail("access_token_id", tokens.access.record.id.to_string())
        .detail("refresh_issued", tokens.refresh.is_some()))
}

/// Exchanges an authorization code for tokens
pub struct AuthorizationCodeFlow {
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
    preconditions: ConditionChain,
    postconditions: ConditionChain,
}

impl AuthorizationCodeFlow {
    /// Build the flow's condition chains
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        let preconditions = ConditionChain::new("authorization_code.pre")
            .with(GrantEnabled::new(deps, GrantType::AuthorizationCode))
            .with(RequirePresent::<AuthorizationCodeGrant>::new("code", |g| {
                non_blank(g.code.as_deref())
            }))
            .with(RequirePresent::<AuthorizationCodeGrant>::new("redirect_uri", |g| {
                non_blank(g.redirect_uri.as_deref())
            }))
            .with(AuthenticateClient::<AuthorizationCodeGrant>::new(
                deps,
                GrantType::AuthorizationCode,
            ))
            .with(CheckTokenLimit::access_tokens(deps))
            .with(InspectAuthorizationCode {
                storage: Arc::clone(&deps.storage),
                clock: Arc::clone(&deps.clock),
            });

        let postconditions = ConditionChain::new("authorization_code.post")
            .with(RedeemCodeForTokens {
                storage: Arc::clone(&deps.storage),
                config: Arc::clone(&deps.config),
                clock: Arc::clone(&deps.clock),
            })
            .with(AppendAudit::new(deps.audit_trail(), describe_token_issued));

        Self {
            config: Arc::clone(&deps.config),
            clock: Arc::clone(&deps.clock),
            preconditions,
            postconditions,
        }
    }
}

#[async_trait]
impl GrantFlow for AuthorizationCodeFlow {
    type Params = AuthorizationCodeGrant;

    fn name(&self) -> &'static str {
        "authorization_code"
    }

    fn preconditions(&self) -> &ConditionChain {
        &self.preconditions
    }

    async fn run(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let client = &ctx.require::<ResolvedClient>()?.0;
        let code = &ctx.require::<RedeemedCode>()?.0;
        let now = self.clock.now();

        let tokens = mint_token_pair(&self.config, client, Some(&code.user_id), &code.scope, now)?;
        let body = tokens.response(now);
        ctx.provide(tokens)?;
        Ok(Outcome::success(body, ray_id))
    }

    fn postconditions(&self) -> &ConditionChain {
        &self.postconditions
    }
}
