// ABOUTME: client_credentials grant issuing an access token to an authenticated confidential client
// ABOUTME: No user is involved and no refresh token is issued
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::errors::AppResult;
use warden_core::models::GrantType;
use warden_core::outcome::{Outcome, RayId};

use super::guards::{
    AuthenticateClient, CheckTokenLimit, GrantEnabled, PersistIssuedTokens, ScopeWithinClient,
};
use super::issuance::{mint_access_token, IssuedTokens};
use super::kernel::{FlowDependencies, GrantFlow};
use super::{ClientCredentials, GrantedScope, PresentsClient, RequestsScope, ResolvedClient};
use crate::audit::{AppendAudit, AuditEntry};
use crate::clock::Clock;
use crate::conditions::ConditionChain;
use crate::config::OAuth2Config;
use crate::constants::events;
use crate::context::ExecutionContext;

/// Token request for the `client_credentials` grant (RFC 6749 §4.4.2)
#[derive(Debug, Clone)]
pub struct ClientCredentialsGrant {
    /// Presenting client; must be confidential
    pub client: ClientCredentials,
    /// Requested scope
    pub scope: Option<String>,
}

impl PresentsClient for ClientCredentialsGrant {
    fn client_credentials(&self) -> &ClientCredentials {
        &self.client
    }
}

impl RequestsScope for ClientCredentialsGrant {
    fn requested_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

fn describe_token_issued(ctx: &ExecutionContext) -> AppResult<AuditEntry> {
    let tokens = ctx.require::<IssuedTokens>()?;
    let access = &tokens.access.record;
    Ok(AuditEntry::new(events::TOKEN_ISSUED, &access.client_id)
        .client(&access.client_id)
        .detail("grant_type", GrantType::ClientCredentials.as_str())
        .detail("access_token_id", access.id.to_string())
        .detail("scope", access.scope.to_string()))
}

/// Machine-to-machine token issuance
pub struct ClientCredentialsFlow {
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
    preconditions: ConditionChain,
    postconditions: ConditionChain,
}

impl ClientCredentialsFlow {
    /// Build the flow's condition chains
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        let preconditions = ConditionChain::new("client_credentials.pre")
            .with(GrantEnabled::new(deps, GrantType::ClientCredentials))
            .with(
                AuthenticateClient::<ClientCredentialsGrant>::new(
                    deps,
                    GrantType::ClientCredentials,
                )
                .confidential_only(),
            )
            .with(ScopeWithinClient::<ClientCredentialsGrant>::new())
            .with(CheckTokenLimit::access_tokens(deps));

        let postconditions = ConditionChain::new("client_credentials.post")
            .with(PersistIssuedTokens::new(deps))
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
impl GrantFlow for ClientCredentialsFlow {
    type Params = ClientCredentialsGrant;

    fn name(&self) -> &'static str {
        "client_credentials"
    }

    fn preconditions(&self) -> &ConditionChain {
        &self.preconditions
    }

    async fn run(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let client_id = ctx.require::<ResolvedClient>()?.0.client_id.clone();
        let scope = ctx.require::<GrantedScope>()?.0.clone();
        let now = self.clock.now();

        let tokens = IssuedTokens {
            access: mint_access_token(&self.config, &client_id, None, scope, None, now)?,
            refresh: None,
        };
        let body = tokens.response(now);
        ctx.provide(tokens)?;
        Ok(Outcome::success(body, ray_id))
    }

    fn postconditions(&self) -> &ConditionChain {
        &self.postconditions
    }
}
