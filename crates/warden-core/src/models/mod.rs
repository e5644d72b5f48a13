// ABOUTME: Persisted and domain-facing data models for clients, tokens, codes, and audit
// ABOUTME: Every persisted record carries a stable internal id distinct from its secret value
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit trail rows (append-only)
pub mod audit;
/// Authorization codes with PKCE binding
pub mod authorization_code;
/// Persisted client records and the once-only registration view
pub mod client;
/// Device authorization codes (RFC 8628)
pub mod device_code;
/// Grant types, client types, PKCE methods, and scope sets
pub mod grant;
/// Access and refresh tokens
pub mod token;

pub use audit::AuditRecord;
pub use authorization_code::AuthorizationCode;
pub use client::{ClientRecord, RegisteredClient};
pub use device_code::{DeviceCode, DeviceCodeStatus};
pub use grant::{ClientType, GrantType, PkceMethod, Scope};
pub use token::{AccessToken, RefreshToken};

/// Creation and last-update audit fields carried by every mutable record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// Actor that created the record
    pub created_by: String,
    /// When the record was last replaced
    pub updated_at: DateTime<Utc>,
    /// Actor that last replaced the record
    pub updated_by: String,
}

impl AuditStamp {
    /// Stamp for a freshly created record
    pub fn new(now: DateTime<Utc>, actor: impl Into<String>) -> Self {
        let actor = actor.into();
        Self {
            created_at: now,
            created_by: actor.clone(),
            updated_at: now,
            updated_by: actor,
        }
    }

    /// Record an update by `actor` at `now`
    pub fn touch(&mut self, now: DateTime<Utc>, actor: impl Into<String>) {
        self.updated_at = now;
        self.updated_by = actor.into();
    }
}
