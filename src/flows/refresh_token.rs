// ABOUTME: refresh_token grant exchanging a live refresh token for a new access token
// ABOUTME: Rotation revokes the old refresh token and inserts its successor in one transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use warden_core::errors::{codes, AppResult};
use warden_core::models::{GrantType, RefreshToken, Scope};
use warden_core::outcome::{Outcome, RayId};

use super::guards::{
    non_blank, AuthenticateClient, CheckTokenLimit, GrantEnabled, RequirePresent,
};
use super::issuance::{
    enforce_token_limit, insert_access_token, limit_filter, mint_access_token, mint_refresh_token,
    IssuedTokens, Revocable,
};
use super::kernel::{FlowDependencies, GrantFlow};
use super::{ClientCredentials, PresentsClient, ResolvedClient};
use crate::audit::{AppendAudit, AuditEntry};
use crate::clock::Clock;
use crate::conditions::{Condition, ConditionChain};
use crate::config::OAuth2Config;
use crate::constants::events;
use crate::context::ExecutionContext;
use crate::storage::{secret_digest, StorageBackend};

/// Token request for the `refresh_token` grant (RFC 6749 §6)
#[derive(Debug, Clone)]
pub struct RefreshTokenGrant {
    /// Presenting client
    pub client: ClientCredentials,
    /// Refresh token being exchanged
    pub refresh_token: Option<String>,
    /// Optional narrower scope
    pub scope: Option<String>,
}

impl PresentsClient for RefreshTokenGrant {
    fn client_credentials(&self) -> &ClientCredentials {
        &self.client
    }
}

/// Refresh token presented by this request, as read during pre-conditions
#[derive(Debug, Clone)]
pub struct PresentedRefreshToken(pub RefreshToken);

struct ResolveRefreshToken {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Condition for ResolveRefreshToken {
    fn name(&self) -> &'static str {
        "resolve_refresh_token"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let raw = ctx
            .require::<RefreshTokenGrant>()?
            .refresh_token
            .clone()
            .unwrap_or_default();
        let client_id = ctx.require::<ResolvedClient>()?.0.client_id.clone();

        let stored = {
            let mut tx = self.storage.begin().await?;
            tx.refresh_tokens()
                .get_by_natural_key(&secret_digest(&raw))
                .await?
        };

        let now = self.clock.now();
        let Some(token) = stored
            .filter(|t| t.client_id == client_id)
            .filter(|t| t.is_active(now))
        else {
            warn!(ray_id = %ray_id, client_id = %client_id, "refresh token unknown, inactive, or foreign");
            return Ok(Outcome::failed(
                codes::oauth::INVALID_GRANT,
                "invalid refresh token",
                ray_id,
            ));
        };

        ctx.provide(PresentedRefreshToken(token))?;
        Ok(Outcome::empty_success(ray_id))
    }
}

/// Revoke-or-touch the old refresh token, insert successor and access token,
/// all in one transaction
///
/// Rotation revokes only the presented refresh token. Access tokens issued
/// under it stay valid until they expire or FIFO eviction revokes them.
struct PersistRefreshExchange {
    storage: Arc<dyn StorageBackend>,
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Condition for PersistRefreshExchange {
    fn name(&self) -> &'static str {
        "persist_refresh_exchange"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let presented_id = ctx.require::<PresentedRefreshToken>()?.0.id;
        let tokens = ctx.require::<IssuedTokens>()?;
        let now = self.clock.now();

        let mut tx = self.storage.begin().await?;
        let Some(mut old) = tx
            .refresh_tokens()
            .get(presented_id)
            .await?
            .filter(|t| t.is_active(now))
        else {
            warn!(ray_id = %ray_id, refresh_token_id = %presented_id, "refresh token revoked concurrently");
            return Ok(Outcome::failed(
                codes::oauth::INVALID_GRANT,
                "refresh token is no longer valid",
                ray_id,
            ));
        };
        let actor = old.client_id.clone();

        if let Some(successor) = &tokens.refresh {
            // earlier access tokens keep their own lifetime
            old.revoke(now, &actor);
            tx.refresh_tokens().update(old).await?;

            let record = &successor.record;
            let filter = limit_filter(
                &self.config.refresh_token_limit,
                &record.client_id,
                record.user_id.as_deref(),
                None,
                now,
            );
            enforce_token_limit(
                tx.refresh_tokens(),
                &self.config.refresh_token_limit,
                &filter,
                &actor,
                now,
            )
            .await?;
            tx.refresh_tokens().insert(record.clone()).await?;
        } else {
            old.stamp.touch(now, actor.as_str());
            tx.refresh_tokens().update(old).await?;
        }

        insert_access_token(tx.as_mut(), &self.config, &tokens.access.record, now).await?;
        tx.commit().await?;
        debug!(ray_id = %ray_id, rotated = tokens.refresh.is_some(), "refresh exchange persisted");
        Ok(Outcome::empty_success(ray_id))
    }
}

fn describe_token_refreshed(ctx: &ExecutionContext) -> AppResult<AuditEntry> {
    let old = &ctx.require::<PresentedRefreshToken>()?.0;
    let tokens = ctx.require::<IssuedTokens>()?;
    let mut entry = AuditEntry::new(events::TOKEN_REFRESHED, &old.client_id)
        .client(&old.client_id)
        .maybe_user(old.user_id.as_deref())
        .detail("refresh_token_id", old.id.to_string())
        .detail("access_token_id", tokens.access.record.id.to_string());
    if let Some(successor) = &tokens.refresh {
        entry = entry.detail("rotated_to", successor.record.id.to_string());
    }
    Ok(entry)
}

/// Exchanges refresh tokens, rotating them when configured
pub struct RefreshTokenFlow {
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
    preconditions: ConditionChain,
    postconditions: ConditionChain,
}

impl RefreshTokenFlow {
    /// Build the flow's condition chains
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        let preconditions = ConditionChain::new("refresh_token.pre")
            .with(GrantEnabled::new(deps, GrantType::RefreshToken))
            .with(RequirePresent::<RefreshTokenGrant>::new("refresh_token", |g| {
                non_blank(g.refresh_token.as_deref())
            }))
            .with(AuthenticateClient::<RefreshTokenGrant>::new(
                deps,
                GrantType::RefreshToken,
            ))
            .with(ResolveRefreshToken {
                storage: Arc::clone(&deps.storage),
                clock: Arc::clone(&deps.clock),
            })
            .with(CheckTokenLimit::access_tokens(deps));

        let postconditions = ConditionChain::new("refresh_token.post")
            .with(PersistRefreshExchange {
                storage: Arc::clone(&deps.storage),
                config: Arc::clone(&deps.config),
                clock: Arc::clone(&deps.clock),
            })
            .with(AppendAudit::new(deps.audit_trail(), describe_token_refreshed));

        Self {
            config: Arc::clone(&deps.config),
            clock: Arc::clone(&deps.clock),
            preconditions,
            postconditions,
        }
    }
}

#[async_trait]
impl GrantFlow for RefreshTokenFlow {
    type Params = RefreshTokenGrant;

    fn name(&self) -> &'static str {
        "refresh_token"
    }

    fn preconditions(&self) -> &ConditionChain {
        &self.preconditions
    }

    async fn run(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let requested = Scope::parse(ctx.require::<RefreshTokenGrant>()?.scope.as_deref());
        let old = &ctx.require::<PresentedRefreshToken>()?.0;

        let scope = if requested.is_empty() {
            old.scope.clone()
        } else if requested.is_subset_of(&old.scope) {
            requested
        } else {
            return Ok(Outcome::failed(
                codes::oauth::SCOPE_EXCEEDED,
                format!(
                    "scope exceeds the original grant: {}",
                    requested.excess_over(&old.scope).join(" ")
                ),
                ray_id,
            ));
        };

        let now = self.clock.now();
        let user_id = old.user_id.as_deref();
        let refresh = if self.config.rotate_refresh_tokens {
            Some(mint_refresh_token(
                &self.config,
                &old.client_id,
                user_id,
                old.scope.clone(),
                Some(old.id),
                now,
            )?)
        } else {
            None
        };
        let parent = refresh.as_ref().map_or(old.id, |r| r.record.id);
        let access = mint_access_token(&self.config, &old.client_id, user_id, scope, Some(parent), now)?;

        let tokens = IssuedTokens { access, refresh };
        let body = tokens.response(now);
        ctx.provide(tokens)?;
        Ok(Outcome::success(body, ray_id))
    }

    fn postconditions(&self) -> &ConditionChain {
        &self.postconditions
    }
}
