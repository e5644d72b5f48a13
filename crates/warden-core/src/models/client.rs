// ABOUTME: Storage-facing client record holding the secret hash, and the domain-facing registration view
// ABOUTME: Records are replaced whole through the generic update contract, never rotated in place
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuditStamp, ClientType, GrantType, Scope};

/// Persisted OAuth 2.0 client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Internal primary key
    pub id: Uuid,
    /// Public OAuth 2.0 client identifier (natural key)
    pub client_id: String,
    /// Confidential or public
    pub client_type: ClientType,
    /// Self-describing password hash of the client secret; `None` for public clients
    pub client_secret_hash: Option<String>,
    /// User that owns the client; bound into the secret hash
    pub owner_id: String,
    /// Human-readable client name
    pub client_name: Option<String>,
    /// Registered redirect URIs (exact match)
    pub redirect_uris: Vec<String>,
    /// Grant types the client may use
    pub grant_types: Vec<GrantType>,
    /// Response types the client may request
    pub response_types: Vec<String>,
    /// Maximum scope the client may request
    pub scope: Scope,
    /// Disabled clients fail authentication
    pub enabled: bool,
    /// Optional registration expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation and update audit fields
    pub stamp: AuditStamp,
}

impl ClientRecord {
    /// `true` if the client registered for `grant`
    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// `true` for confidential clients
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.client_type == ClientType::Confidential
    }

    /// `true` once the registration expiry has passed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Client as returned to the registrant, exactly once, with the raw secret
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredClient {
    /// Public OAuth 2.0 client identifier
    pub client_id: String,
    /// Raw secret; `None` for public clients. Never persisted.
    pub client_secret: Option<String>,
    /// Confidential or public
    pub client_type: ClientType,
    /// Human-readable client name
    pub client_name: Option<String>,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Grant types the client may use
    pub grant_types: Vec<GrantType>,
    /// Response types the client may request
    pub response_types: Vec<String>,
    /// Maximum scope the client may request
    pub scope: Option<String>,
    /// RFC 7591 `client_id_issued_at` (seconds since epoch)
    pub client_id_issued_at: i64,
    /// RFC 7591 `client_secret_expires_at`; 0 means no expiry
    pub client_secret_expires_at: i64,
}

impl RegisteredClient {
    /// Build the once-only view from the persisted record and the raw secret
    #[must_use]
    pub fn from_record(record: &ClientRecord, client_secret: Option<String>) -> Self {
        Self {
            client_id: record.client_id.clone(),
            client_secret,
            client_type: record.client_type,
            client_name: record.client_name.clone(),
            redirect_uris: record.redirect_uris.clone(),
            grant_types: record.grant_types.clone(),
            response_types: record.response_types.clone(),
            scope: record.scope.to_option(),
            client_id_issued_at: record.stamp.created_at.timestamp(),
            client_secret_expires_at: record.expires_at.map_or(0, |at| at.timestamp()),
        }
    }
}
