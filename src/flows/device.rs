// ABOUTME: Device authorization grant: code issuance, user verification, and token polling
// ABOUTME: Poll state is persisted per request; consumption commits together with the issued tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! RFC 8628 in three parts:
//!
//! 1. [`DeviceAuthorizationFlow`] issues a `device_code` and a human `user_code`.
//! 2. [`DeviceVerificationService`] records the user's approval or denial.
//! 3. [`DeviceCodeFlow`] is polled by the device until tokens are issued.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use warden_core::errors::{codes, AppError, AppResult, ErrorCode, StorageError};
use warden_core::models::{AuditStamp, DeviceCode, DeviceCodeStatus, GrantType};
use warden_core::outcome::{Outcome, RayId};

use super::guards::{
    non_blank, AuthenticateClient, CheckTokenLimit, GrantEnabled, RequirePresent,
    ScopeWithinClient,
};
use super::issuance::{mint_token_pair, persist_issued_tokens, IssuedTokens};
use super::kernel::{FlowDependencies, GrantFlow};
use super::{ClientCredentials, GrantedScope, PresentsClient, RequestsScope, ResolvedClient};
use crate::audit::{AppendAudit, AuditEntry, AuditTrail};
use crate::clock::Clock;
use crate::conditions::{Condition, ConditionChain};
use crate::config::OAuth2Config;
use crate::constants::{events, secrets, ttl};
use crate::context::ExecutionContext;
use crate::credentials::{normalize_user_code, random_token, random_user_code};
use crate::storage::{secret_digest, Record, RecordFilter, StorageBackend, Transaction};

/// Attempts at drawing a user code not held by another live device code
const USER_CODE_ATTEMPTS: usize = 5;

/// Device authorization request (RFC 8628 §3.1)
#[derive(Debug, Clone)]
pub struct DeviceAuthorizationRequest {
    /// Presenting client; public clients are allowed
    pub client: ClientCredentials,
    /// Requested scope
    pub scope: Option<String>,
}

impl PresentsClient for DeviceAuthorizationRequest {
    fn client_credentials(&self) -> &ClientCredentials {
        &self.client
    }
}

impl RequestsScope for DeviceAuthorizationRequest {
    fn requested_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// Device code generated by the run phase, awaiting persistence
#[derive(Debug, Clone)]
pub struct PendingDeviceCode(pub DeviceCode);

struct PersistDeviceCode {
    storage: Arc<dyn StorageBackend>,
}

#[async_trait]
impl Condition for PersistDeviceCode {
    fn name(&self) -> &'static str {
        "persist_device_code"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let device = ctx.require::<PendingDeviceCode>()?.0.clone();
        let now = device.stamp.created_at;
        let mut tx = self.storage.begin().await?;
        insert_with_unique_user_code(tx.as_mut(), device, now).await?;
        tx.commit().await?;
        Ok(Outcome::empty_success(ray_id))
    }
}

/// Insert `device` unless a live device code already holds its user code
///
/// The check and the insert share `tx`, so two requests that drew the same
/// user code cannot both persist.
async fn insert_with_unique_user_code(
    tx: &mut dyn Transaction,
    device: DeviceCode,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let filter = RecordFilter::new()
        .alternate_key(&device.user_code)
        .active_at(now);
    if !tx.device_codes().list(&filter).await?.is_empty() {
        warn!(device_code_id = %device.id, "user code taken by a live device code");
        return Err(StorageError::Duplicate {
            kind: DeviceCode::KIND,
        }
        .into());
    }
    tx.device_codes().insert(device).await?;
    Ok(())
}

fn describe_device_started(ctx: &ExecutionContext) -> AppResult<AuditEntry> {
    let device = &ctx.require::<PendingDeviceCode>()?.0;
    Ok(
        AuditEntry::new(events::DEVICE_AUTHORIZATION_STARTED, &device.client_id)
            .client(&device.client_id)
            .detail("device_code_id", device.id.to_string())
            .detail("scope", device.scope.to_string()),
    )
}

/// Issues device and user codes
pub struct DeviceAuthorizationFlow {
    storage: Arc<dyn StorageBackend>,
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
    preconditions: ConditionChain,
    postconditions: ConditionChain,
}

impl DeviceAuthorizationFlow {
    /// Build the flow's condition chains
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        let preconditions = ConditionChain::new("device_authorization.pre")
            .with(GrantEnabled::new(deps, GrantType::DeviceCode))
            .with(AuthenticateClient::<DeviceAuthorizationRequest>::new(
                deps,
                GrantType::DeviceCode,
            ))
            .with(ScopeWithinClient::<DeviceAuthorizationRequest>::new());

        let postconditions = ConditionChain::new("device_authorization.post")
            .with(PersistDeviceCode {
                storage: Arc::clone(&deps.storage),
            })
            .with(AppendAudit::new(deps.audit_trail(), describe_device_started));

        Self {
            storage: Arc::clone(&deps.storage),
            config: Arc::clone(&deps.config),
            clock: Arc::clone(&deps.clock),
            preconditions,
            postconditions,
        }
    }

    /// Draw a user code no live device code holds; persistence re-checks
    async fn unused_user_code(&self, now: DateTime<Utc>) -> AppResult<String> {
        let mut tx = self.storage.begin().await?;
        for _ in 0..USER_CODE_ATTEMPTS {
            let candidate = random_user_code()?;
            let filter = RecordFilter::new().alternate_key(&candidate).active_at(now);
            if tx.device_codes().list(&filter).await?.is_empty() {
                return Ok(candidate);
            }
            debug!("user code collision, drawing again");
        }
        Err(AppError::internal("could not draw an unused device user code"))
    }

    fn verification_uri_complete(&self, user_code: &str) -> AppResult<String> {
        let mut uri = Url::parse(&self.config.device_verification_uri).map_err(|e| {
            AppError::config_invalid("device verification uri is not a valid URL").with_source(e)
        })?;
        uri.query_pairs_mut().append_pair("user_code", user_code);
        Ok(uri.into())
    }
}

#[async_trait]
impl GrantFlow for DeviceAuthorizationFlow {
    type Params = DeviceAuthorizationRequest;

    fn name(&self) -> &'static str {
        "device_authorization"
    }

    fn preconditions(&self) -> &ConditionChain {
        &self.preconditions
    }

    async fn run(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let client_id = ctx.require::<ResolvedClient>()?.0.client_id.clone();
        let scope = ctx.require::<GrantedScope>()?.0.clone();
        let now = self.clock.now();

        let raw_device_code = random_token(secrets::TOKEN_BYTES)?;
        let user_code = self.unused_user_code(now).await?;
        let device = DeviceCode {
            id: Uuid::new_v4(),
            device_code_digest: secret_digest(&raw_device_code),
            user_code: user_code.clone(),
            client_id: client_id.clone(),
            scope,
            status: DeviceCodeStatus::Pending,
            user_id: None,
            interval_secs: self.config.device_poll_interval_secs,
            last_polled_at: None,
            expires_at: self.config.device_code_expiry(now)?,
            consumed_at: None,
            stamp: AuditStamp::new(now, client_id),
        };
        ctx.provide(PendingDeviceCode(device))?;

        Ok(Outcome::success(
            json!({
                "device_code": raw_device_code,
                "user_code": user_code,
                "verification_uri": self.config.device_verification_uri,
                "verification_uri_complete": self.verification_uri_complete(&user_code)?,
                "expires_in": self.config.device_code_ttl_secs,
                "interval": self.config.device_poll_interval_secs,
            }),
            ray_id,
        ))
    }

    fn postconditions(&self) -> &ConditionChain {
        &self.postconditions
    }
}

/// Records the user's decision on a pending device authorization
///
/// Called by the embedder's verification page after it has authenticated the
/// user. Decisions are final: a code can be approved or denied once.
#[derive(Clone)]
pub struct DeviceVerificationService {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl DeviceVerificationService {
    /// Service over the flow dependencies' storage and clock
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        Self {
            storage: Arc::clone(&deps.storage),
            clock: Arc::clone(&deps.clock),
            audit: deps.audit_trail(),
        }
    }

    /// Approve the device code identified by `user_code` on behalf of `user_id`
    ///
    /// # Errors
    ///
    /// Infrastructure faults only
    pub async fn approve(&self, user_code: &str, user_id: &str, ray_id: &RayId) -> AppResult<Outcome> {
        self.decide(user_code, user_id, DeviceCodeStatus::Approved, ray_id)
            .await
    }

    /// Deny the device code identified by `user_code` on behalf of `user_id`
    ///
    /// # Errors
    ///
    /// Infrastructure faults only
    pub async fn deny(&self, user_code: &str, user_id: &str, ray_id: &RayId) -> AppResult<Outcome> {
        self.decide(user_code, user_id, DeviceCodeStatus::Denied, ray_id)
            .await
    }

    async fn decide(
        &self,
        user_code: &str,
        user_id: &str,
        decision: DeviceCodeStatus,
        ray_id: &RayId,
    ) -> AppResult<Outcome> {
        let user_code = normalize_user_code(user_code);
        let now = self.clock.now();

        let mut tx = self.storage.begin().await?;
        let filter = RecordFilter::new().alternate_key(&user_code);
        let Some(mut device) = tx
            .device_codes()
            .list(&filter)
            .await?
            .into_iter()
            .filter(|d| d.consumed_at.is_none())
            .max_by_key(|d| d.stamp.created_at)
        else {
            return Ok(Outcome::failed(
                codes::oauth::INVALID_GRANT,
                "unknown user code",
                ray_id,
            ));
        };

        if device.is_expired(now) {
            return Ok(Outcome::failed(
                codes::oauth_device::EXPIRED_TOKEN,
                "user code has expired",
                ray_id,
            ));
        }
        if device.status != DeviceCodeStatus::Pending {
            return Ok(Outcome::failed(
                codes::oauth::INVALID_REQUEST,
                "user code has already been decided",
                ray_id,
            ));
        }

        device.status = decision;
        device.user_id = Some(user_id.to_owned());
        device.stamp.touch(now, user_id);
        let (device_id, client_id) = (device.id, device.client_id.clone());
        tx.device_codes().update(device).await?;
        tx.commit().await?;

        let approved = decision == DeviceCodeStatus::Approved;
        info!(ray_id = %ray_id, client_id = %client_id, approved, "device authorization decided");
        self.audit
            .record(
                AuditEntry::new(events::DEVICE_DECISION, user_id)
                    .client(&client_id)
                    .user(user_id)
                    .detail("device_code_id", device_id.to_string())
                    .detail("approved", approved),
                ray_id,
            )
            .await;

        Ok(Outcome::success(
            json!({ "user_code": user_code, "approved": approved }),
            ray_id,
        ))
    }
}

/// Token request for the device code grant (RFC 8628 §3.4)
#[derive(Debug, Clone)]
pub struct DeviceCodeGrant {
    /// Presenting client
    pub client: ClientCredentials,
    /// Device code from the authorization response
    pub device_code: Option<String>,
}

impl PresentsClient for DeviceCodeGrant {
    fn client_credentials(&self) -> &ClientCredentials {
        &self.client
    }
}

/// Approved device code this poll redeems
#[derive(Debug, Clone)]
pub struct ApprovedDeviceCode(pub DeviceCode);

/// Poll gate; persists poll bookkeeping before returning a pending answer
struct PollDeviceCode {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

enum PollVerdict {
    Reject(ErrorCode, &'static str),
    /// Reject after persisting the updated row
    Throttle(ErrorCode, &'static str),
    Issue,
}

impl PollDeviceCode {
    fn judge(device: &mut DeviceCode, now: DateTime<Utc>) -> PollVerdict {
        if device.consumed_at.is_some() {
            return PollVerdict::Reject(codes::oauth::INVALID_GRANT, "device code already used");
        }
        if device.is_expired(now) {
            return PollVerdict::Reject(codes::oauth_device::EXPIRED_TOKEN, "device code has expired");
        }
        match device.status {
            DeviceCodeStatus::Denied => PollVerdict::Reject(
                codes::oauth_device::ACCESS_DENIED,
                "the user denied the request",
            ),
            DeviceCodeStatus::Approved => PollVerdict::Issue,
            DeviceCodeStatus::Pending => {
                let too_fast = device.last_polled_at.is_some_and(|last| {
                    match Duration::try_seconds(device.interval_secs) {
                        Some(interval) => now - last < interval,
                        None => true,
                    }
                });
                device.last_polled_at = Some(now);
                if too_fast {
                    device.interval_secs = device
                        .interval_secs
                        .saturating_add(ttl::DEVICE_SLOW_DOWN_INCREMENT_SECS);
                    PollVerdict::Throttle(
                        codes::oauth_device::SLOW_DOWN,
                        "polling too frequently",
                    )
                } else {
                    PollVerdict::Throttle(
                        codes::oauth_device::AUTHORIZATION_PENDING,
                        "the user has not decided yet",
                    )
                }
            }
        }
    }
}

#[async_trait]
impl Condition for PollDeviceCode {
    fn name(&self) -> &'static str {
        "poll_device_code"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let raw = ctx
            .require::<DeviceCodeGrant>()?
            .device_code
            .clone()
            .unwrap_or_default();
        let client_id = ctx.require::<ResolvedClient>()?.0.client_id.clone();
        let now = self.clock.now();

        let mut tx = self.storage.begin().await?;
        let Some(mut device) = tx
            .device_codes()
            .get_by_natural_key(&secret_digest(&raw))
            .await?
            .filter(|d| d.client_id == client_id)
        else {
            warn!(ray_id = %ray_id, client_id = %client_id, "unknown device code");
            return Ok(Outcome::failed(
                codes::oauth::INVALID_GRANT,
                "unknown device code",
                ray_id,
            ));
        };

        let verdict = Self::judge(&mut device, now);
        match verdict {
            PollVerdict::Reject(code, message) => Ok(Outcome::failed(code, message, ray_id)),
            PollVerdict::Throttle(code, message) => {
                device.stamp.touch(now, client_id.as_str());
                tx.device_codes().update(device).await?;
                tx.commit().await?;
                Ok(Outcome::failed(code, message, ray_id))
            }
            PollVerdict::Issue => {
                ctx.provide(ApprovedDeviceCode(device))?;
                Ok(Outcome::empty_success(ray_id))
            }
        }
    }
}

/// Consumes the approved device code and persists the issued tokens in one
/// transaction
///
/// A failed commit leaves the code approved, so the device can poll again.
struct RedeemDeviceCodeForTokens {
    storage: Arc<dyn StorageBackend>,
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Condition for RedeemDeviceCodeForTokens {
    fn name(&self) -> &'static str {
        "redeem_device_code_for_tokens"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let device_id = ctx.require::<ApprovedDeviceCode>()?.0.id;
        let tokens = ctx.require::<IssuedTokens>()?;
        let now = self.clock.now();

        let mut tx = self.storage.begin().await?;
        let Some(mut device) = tx.device_codes().get(device_id).await?.filter(|d| {
            d.consumed_at.is_none() && d.status == DeviceCodeStatus::Approved && !d.is_expired(now)
        }) else {
            warn!(ray_id = %ray_id, device_code_id = %device_id, "device code redeemed concurrently");
            return Ok(Outcome::failed(
                codes::oauth::INVALID_GRANT,
                "device code already used",
                ray_id,
            ));
        };

        let actor = device.client_id.clone();
        device.consumed_at = Some(now);
        device.last_polled_at = Some(now);
        device.stamp.touch(now, actor.as_str());
        tx.device_codes().update(device).await?;
        persist_issued_tokens(tx.as_mut(), &self.config, tokens, now).await?;
        tx.commit().await?;
        Ok(Outcome::empty_success(ray_id))
    }
}

fn describe_device_tokens(ctx: &ExecutionContext) -> AppResult<AuditEntry> {
    let device = &ctx.require::<ApprovedDeviceCode>()?.0;
    let tokens = ctx.require::<IssuedTokens>()?;
    Ok(AuditEntry::new(events::TOKEN_ISSUED, &device.client_id)
        .client(&device.client_id)
        .maybe_user(device.user_id.as_deref())
        .detail("grant_type", GrantType::DeviceCode.as_str())
        .detail("device_code_id", device.id.to_string())
        .detail("access_token_id", tokens.access.record.id.to_string())
        .detail("refresh_issued", tokens.refresh.is_some()))
}

/// Device polling grant
pub struct DeviceCodeFlow {
    config: Arc<OAuth2Config>,
    clock: Arc<dyn Clock>,
    preconditions: ConditionChain,
    postconditions: ConditionChain,
}

impl DeviceCodeFlow {
    /// Build the flow's condition chains
    #[must_use]
    pub fn new(deps: &FlowDependencies) -> Self {
        let preconditions = ConditionChain::new("device_code.pre")
            .with(GrantEnabled::new(deps, GrantType::DeviceCode))
            .with(RequirePresent::<DeviceCodeGrant>::new("device_code", |g| {
                non_blank(g.device_code.as_deref())
            }))
            .with(AuthenticateClient::<DeviceCodeGrant>::new(
                deps,
                GrantType::DeviceCode,
            ))
            .with(CheckTokenLimit::access_tokens(deps))
            .with(PollDeviceCode {
                storage: Arc::clone(&deps.storage),
                clock: Arc::clone(&deps.clock),
            });

        let postconditions = ConditionChain::new("device_code.post")
            .with(RedeemDeviceCodeForTokens {
                storage: Arc::clone(&deps.storage),
                config: Arc::clone(&deps.config),
                clock: Arc::clone(&deps.clock),
            })
            .with(AppendAudit::new(deps.audit_trail(), describe_device_tokens));

        Self {
            config: Arc::clone(&deps.config),
            clock: Arc::clone(&deps.clock),
            preconditions,
            postconditions,
        }
    }
}

#[async_trait]
impl GrantFlow for DeviceCodeFlow {
    type Params = DeviceCodeGrant;

    fn name(&self) -> &'static str {
        "device_code"
    }

    fn preconditions(&self) -> &ConditionChain {
        &self.preconditions
    }

    async fn run(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let client = &ctx.require::<ResolvedClient>()?.0;
        let device = &ctx.require::<ApprovedDeviceCode>()?.0;
        let now = self.clock.now();

        let tokens = mint_token_pair(
            &self.config,
            client,
            device.user_id.as_deref(),
            &device.scope,
            now,
        )?;
        let body = tokens.response(now);
        ctx.provide(tokens)?;
        Ok(Outcome::success(body, ray_id))
    }

    fn postconditions(&self) -> &ConditionChain {
        &self.postconditions
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::storage::InMemoryStorage;
    use warden_core::errors::FaultCode;
    use warden_core::models::Scope;

    fn pending(user_code: &str, now: DateTime<Utc>) -> DeviceCode {
        DeviceCode {
            id: Uuid::new_v4(),
            device_code_digest: secret_digest(&Uuid::new_v4().to_string()),
            user_code: user_code.to_owned(),
            client_id: "c1".to_owned(),
            scope: Scope::default(),
            status: DeviceCodeStatus::Pending,
            user_id: None,
            interval_secs: ttl::DEVICE_POLL_INTERVAL_SECS,
            last_polled_at: None,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
            stamp: AuditStamp::new(now, "c1"),
        }
    }

    #[tokio::test]
    async fn live_user_codes_are_unique_at_insert() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();

        let mut tx = storage.begin().await.unwrap();
        insert_with_unique_user_code(tx.as_mut(), pending("BCDF-GHJK", now), now)
            .await
            .unwrap();
        let err = insert_with_unique_user_code(tx.as_mut(), pending("BCDF-GHJK", now), now)
            .await
            .unwrap_err();
        assert_eq!(err.code, FaultCode::DuplicateRecord);
        tx.commit().await.unwrap();

        let later = now + Duration::minutes(16);
        let mut tx = storage.begin().await.unwrap();
        insert_with_unique_user_code(tx.as_mut(), pending("BCDF-GHJK", later), later)
            .await
            .unwrap();
    }

    #[test]
    fn approved_codes_are_issued_without_consuming_them() {
        let now = Utc::now();
        let mut device = pending("BCDF-GHJK", now);
        device.status = DeviceCodeStatus::Approved;
        assert!(matches!(
            PollDeviceCode::judge(&mut device, now),
            PollVerdict::Issue
        ));
        assert!(device.consumed_at.is_none());
    }
}
