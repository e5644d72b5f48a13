// ABOUTME: Append-only audit record written after credential and token lifecycle events
// ABOUTME: Carries the ray_id so audit rows correlate with flow logs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One audit log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Internal primary key
    pub id: Uuid,
    /// Correlation id of the operation that produced the event
    pub ray_id: String,
    /// Event name, e.g. `token.refreshed`
    pub event: String,
    /// Client involved, if any
    pub client_id: Option<String>,
    /// User involved, if any
    pub user_id: Option<String>,
    /// Structured details; never raw secrets
    pub details: Value,
    /// When the event was recorded
    pub created_at: DateTime<Utc>,
    /// Actor that caused the event
    pub created_by: String,
}
