// ABOUTME: Access and refresh token records stored by digest, never by raw value
// ABOUTME: Revocation is a timestamp; activity is derived from revocation and expiry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuditStamp, Scope};

/// Issued access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Internal primary key
    pub id: Uuid,
    /// SHA-256 hex digest of the bearer value (natural key)
    pub token_digest: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Resource owner; `None` for `client_credentials`
    pub user_id: Option<String>,
    /// Refresh token this access token was issued under, if any
    pub refresh_token_id: Option<Uuid>,
    /// Granted scope
    pub scope: Scope,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Revocation time (FIFO eviction or explicit revocation)
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation and update audit fields
    pub stamp: AuditStamp,
}

impl AccessToken {
    /// Not revoked and not expired at `now`
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

/// Issued refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Internal primary key
    pub id: Uuid,
    /// SHA-256 hex digest of the token value (natural key)
    pub token_digest: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Resource owner
    pub user_id: Option<String>,
    /// Scope of the original grant; refreshes may only narrow it
    pub scope: Scope,
    /// Optional expiry; `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Revocation time (rotation, FIFO eviction, or explicit revocation)
    pub revoked_at: Option<DateTime<Utc>>,
    /// Refresh token this one replaced on rotation
    pub rotated_from: Option<Uuid>,
    /// Creation and update audit fields
    pub stamp: AuditStamp,
}

impl RefreshToken {
    /// Not revoked and not expired at `now`
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}
