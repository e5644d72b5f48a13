// ABOUTME: Single-use authorization code record with redirect and PKCE binding
// ABOUTME: Consumption is a timestamp set in the same transaction that validates redemption
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuditStamp, PkceMethod, Scope};

/// Authorization code issued by the authorize step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Internal primary key
    pub id: Uuid,
    /// SHA-256 hex digest of the code value (natural key)
    pub code_digest: String,
    /// Client that requested the code
    pub client_id: String,
    /// User that approved the request
    pub user_id: String,
    /// Redirect URI that must match on redemption
    pub redirect_uri: String,
    /// Approved scope
    pub scope: Scope,
    /// Client state echoed on the redirect
    pub state: Option<String>,
    /// PKCE challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE challenge method
    pub code_challenge_method: Option<PkceMethod>,
    /// Short expiry (minutes)
    pub expires_at: DateTime<Utc>,
    /// When the code was redeemed; set at most once
    pub consumed_at: Option<DateTime<Utc>>,
    /// Creation and update audit fields
    pub stamp: AuditStamp,
}

impl AuthorizationCode {
    /// Not consumed and not expired at `now`
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && now < self.expires_at
    }
}
