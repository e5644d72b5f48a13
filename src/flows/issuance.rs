// ABOUTME: Token minting, FIFO limit enforcement, and atomic persistence of issued tokens
// ABOUTME: Eviction always runs inside the same transaction as the issuance it guards
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;
use warden_core::errors::AppResult;
use warden_core::models::{AccessToken, AuditStamp, ClientRecord, GrantType, RefreshToken, Scope};

use crate::config::{LimitScope, OAuth2Config, TokenLimit};
use crate::constants::secrets;
use crate::credentials::random_token;
use crate::storage::{secret_digest, Record, RecordFilter, StorageResult, Table, Transaction};

/// Persisted record plus the raw value handed to the client once
#[derive(Debug, Clone)]
pub struct MintedToken<T> {
    /// Row to persist (holds only the digest)
    pub record: T,
    /// Raw bearer value
    pub raw: String,
}

/// Tokens produced by a flow's run phase, awaiting persistence
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// New access token
    pub access: MintedToken<AccessToken>,
    /// New refresh token, when the grant yields one
    pub refresh: Option<MintedToken<RefreshToken>>,
}

impl IssuedTokens {
    /// RFC 6749 §5.1 token response body
    #[must_use]
    pub fn response(&self, now: DateTime<Utc>) -> Value {
        let access = &self.access.record;
        let mut body = json!({
            "access_token": self.access.raw,
            "token_type": "Bearer",
            "expires_in": (access.expires_at - now).num_seconds().max(0),
        });
        if let Some(refresh) = &self.refresh {
            body["refresh_token"] = Value::String(refresh.raw.clone());
        }
        if let Some(scope) = access.scope.to_option() {
            body["scope"] = Value::String(scope);
        }
        body
    }
}

/// Mint an access token
///
/// # Errors
///
/// Returns `EntropyFailure` if the RNG fails, `ConfigInvalid` if the
/// configured lifetime overflows
pub fn mint_access_token(
    config: &OAuth2Config,
    client_id: &str,
    user_id: Option<&str>,
    scope: Scope,
    refresh_token_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> AppResult<MintedToken<AccessToken>> {
    let raw = random_token(secrets::TOKEN_BYTES)?;
    Ok(MintedToken {
        record: AccessToken {
            id: Uuid::new_v4(),
            token_digest: secret_digest(&raw),
            client_id: client_id.to_owned(),
            user_id: user_id.map(str::to_owned),
            refresh_token_id,
            scope,
            expires_at: config.access_token_expiry(now)?,
            revoked_at: None,
            stamp: AuditStamp::new(now, client_id),
        },
        raw,
    })
}

/// Mint a refresh token
///
/// # Errors
///
/// Returns `EntropyFailure` if the RNG fails, `ConfigInvalid` if the
/// configured lifetime overflows
pub fn mint_refresh_token(
    config: &OAuth2Config,
    client_id: &str,
    user_id: Option<&str>,
    scope: Scope,
    rotated_from: Option<Uuid>,
    now: DateTime<Utc>,
) -> AppResult<MintedToken<RefreshToken>> {
    let raw = random_token(secrets::TOKEN_BYTES)?;
    Ok(MintedToken {
        record: RefreshToken {
            id: Uuid::new_v4(),
            token_digest: secret_digest(&raw),
            client_id: client_id.to_owned(),
            user_id: user_id.map(str::to_owned),
            scope,
            expires_at: config.refresh_token_expiry(now)?,
            revoked_at: None,
            rotated_from,
            stamp: AuditStamp::new(now, client_id),
        },
        raw,
    })
}

/// `true` if a grant for `client` should also yield a refresh token
#[must_use]
pub fn refresh_allowed(config: &OAuth2Config, client: &ClientRecord) -> bool {
    config.grant_enabled(GrantType::RefreshToken)
        && client.allows_grant(GrantType::RefreshToken)
        && !config.refresh_token_limit.blocks_issuance()
}

/// Mint an access token and, when allowed, a refresh token it is issued under
///
/// # Errors
///
/// Returns `EntropyFailure` if the RNG fails, `ConfigInvalid` if a
/// configured lifetime overflows
pub fn mint_token_pair(
    config: &OAuth2Config,
    client: &ClientRecord,
    user_id: Option<&str>,
    scope: &Scope,
    now: DateTime<Utc>,
) -> AppResult<IssuedTokens> {
    let refresh = if refresh_allowed(config, client) {
        Some(mint_refresh_token(
            config,
            &client.client_id,
            user_id,
            scope.clone(),
            None,
            now,
        )?)
    } else {
        None
    };
    let access = mint_access_token(
        config,
        &client.client_id,
        user_id,
        scope.clone(),
        refresh.as_ref().map(|r| r.record.id),
        now,
    )?;
    Ok(IssuedTokens { access, refresh })
}

/// Records that can be revoked by FIFO eviction
pub trait Revocable: Record {
    /// Mark revoked at `now` by `actor`
    fn revoke(&mut self, now: DateTime<Utc>, actor: &str);
}

impl Revocable for AccessToken {
    fn revoke(&mut self, now: DateTime<Utc>, actor: &str) {
        self.revoked_at = Some(now);
        self.stamp.touch(now, actor);
    }
}

impl Revocable for RefreshToken {
    fn revoke(&mut self, now: DateTime<Utc>, actor: &str) {
        self.revoked_at = Some(now);
        self.stamp.touch(now, actor);
    }
}

/// Filter selecting the tokens that share one FIFO budget
///
/// `PerRefreshToken` falls back to per-(client, user) grouping for access
/// tokens issued without a refresh token.
#[must_use]
pub fn limit_filter(
    limit: &TokenLimit,
    client_id: &str,
    user_id: Option<&str>,
    refresh_token_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> RecordFilter {
    let base = RecordFilter::new().client(client_id).active_at(now);
    match (limit.scope, refresh_token_id) {
        (LimitScope::PerClient, _) => base,
        (LimitScope::PerRefreshToken, Some(parent)) => base.refresh_token(parent),
        (LimitScope::PerClientUser | LimitScope::PerRefreshToken, _) => base.user(user_id),
    }
}

/// Revoke the oldest active tokens until one more fits under the limit
///
/// Returns how many tokens were revoked. Ordering is by creation time, then
/// id, so ties break deterministically.
///
/// # Errors
///
/// Propagates storage errors from the listing or the revocation updates
pub async fn enforce_token_limit<R: Revocable>(
    table: &mut dyn Table<R>,
    limit: &TokenLimit,
    filter: &RecordFilter,
    actor: &str,
    now: DateTime<Utc>,
) -> StorageResult<usize> {
    let Some(max_active) = limit.max_active else {
        return Ok(0);
    };

    let mut active = table.list(filter).await?;
    if active.len() < max_active {
        return Ok(0);
    }
    active.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });

    let excess = active.len() + 1 - max_active.max(1);
    for mut token in active.into_iter().take(excess) {
        token.revoke(now, actor);
        table.update(token).await?;
    }
    debug!(kind = R::KIND, revoked = excess, max_active, "fifo eviction");
    Ok(excess)
}

/// Insert freshly issued tokens, evicting per the configured limits first
///
/// # Errors
///
/// Propagates storage errors; the caller's transaction then rolls back
pub async fn persist_issued_tokens(
    tx: &mut dyn Transaction,
    config: &OAuth2Config,
    tokens: &IssuedTokens,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    if let Some(refresh) = &tokens.refresh {
        let record = &refresh.record;
        let filter = limit_filter(
            &config.refresh_token_limit,
            &record.client_id,
            record.user_id.as_deref(),
            None,
            now,
        );
        enforce_token_limit(
            tx.refresh_tokens(),
            &config.refresh_token_limit,
            &filter,
            &record.client_id,
            now,
        )
        .await?;
        tx.refresh_tokens().insert(record.clone()).await?;
    }

    insert_access_token(tx, config, &tokens.access.record, now).await
}

/// Insert one access token after FIFO enforcement
///
/// # Errors
///
/// Propagates storage errors
pub async fn insert_access_token(
    tx: &mut dyn Transaction,
    config: &OAuth2Config,
    record: &AccessToken,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let filter = limit_filter(
        &config.access_token_limit,
        &record.client_id,
        record.user_id.as_deref(),
        record.refresh_token_id,
        now,
    );
    enforce_token_limit(
        tx.access_tokens(),
        &config.access_token_limit,
        &filter,
        &record.client_id,
        now,
    )
    .await?;
    tx.access_tokens().insert(record.clone()).await
}
