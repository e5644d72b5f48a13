// ABOUTME: Device authorization record pairing a secret device code with a human user code
// ABOUTME: Tracks the user's decision, polling cadence, expiry, and single-use consumption
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuditStamp, Scope};

/// User decision on a device authorization request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCodeStatus {
    /// Waiting for the user
    Pending,
    /// User approved
    Approved,
    /// User denied
    Denied,
}

/// Device authorization (RFC 8628 §3.2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    /// Internal primary key
    pub id: Uuid,
    /// SHA-256 hex digest of the device code (natural key)
    pub device_code_digest: String,
    /// Short human code typed on the verification page (alternate key)
    pub user_code: String,
    /// Client that started the authorization
    pub client_id: String,
    /// Requested scope
    pub scope: Scope,
    /// User decision
    pub status: DeviceCodeStatus,
    /// User that approved or denied
    pub user_id: Option<String>,
    /// Minimum seconds between polls
    pub interval_secs: i64,
    /// Last token-endpoint poll
    pub last_polled_at: Option<DateTime<Utc>>,
    /// Expiry of both codes
    pub expires_at: DateTime<Utc>,
    /// When tokens were issued for this code
    pub consumed_at: Option<DateTime<Utc>>,
    /// Creation and update audit fields
    pub stamp: AuditStamp,
}

impl DeviceCode {
    /// `true` once the expiry has passed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
