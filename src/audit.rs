// ABOUTME: Best-effort audit trail appended after credential and token lifecycle events
// ABOUTME: Append failures are logged and swallowed so they never change a flow's outcome
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::errors::AppResult;
use warden_core::models::AuditRecord;
use warden_core::outcome::{Outcome, RayId};

use crate::clock::Clock;
use crate::conditions::Condition;
use crate::context::ExecutionContext;
use crate::storage::{StorageBackend, StorageResult};

/// Audit row under construction
#[derive(Debug, Clone)]
pub struct AuditEntry {
    event: &'static str,
    actor: String,
    client_id: Option<String>,
    user_id: Option<String>,
    details: Map<String, Value>,
}

impl AuditEntry {
    /// Entry for `event` caused by `actor`
    pub fn new(event: &'static str, actor: impl Into<String>) -> Self {
        Self {
            event,
            actor: actor.into(),
            client_id: None,
            user_id: None,
            details: Map::new(),
        }
    }

    /// Client involved
    #[must_use]
    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// User involved
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// User involved, if any
    #[must_use]
    pub fn maybe_user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_owned);
        self
    }

    /// Extra structured detail; never pass raw secrets
    #[must_use]
    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }

    /// Event name
    #[must_use]
    pub const fn event(&self) -> &'static str {
        self.event
    }
}

/// Writes audit rows in their own transaction
#[derive(Clone)]
pub struct AuditTrail {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    /// Audit trail over `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Append `entry`; failures are logged at `warn` and otherwise ignored
    ///
    /// Must not be called while the caller holds an open transaction.
    pub async fn record(&self, entry: AuditEntry, ray_id: &RayId) {
        let event = entry.event;
        match self.append(entry, ray_id).await {
            Ok(()) => debug!(ray_id = %ray_id, event, "audit record appended"),
            Err(e) => warn!(ray_id = %ray_id, event, error = %e, "audit append failed"),
        }
    }

    async fn append(&self, entry: AuditEntry, ray_id: &RayId) -> StorageResult<()> {
        let record = AuditRecord {
            id: Uuid::new_v4(),
            ray_id: ray_id.as_str().to_owned(),
            event: entry.event.to_owned(),
            client_id: entry.client_id,
            user_id: entry.user_id,
            details: Value::Object(entry.details),
            created_at: self.clock.now(),
            created_by: entry.actor,
        };
        let mut tx = self.storage.begin().await?;
        tx.audit_log().append(record).await?;
        tx.commit().await
    }
}

/// Builds the audit entry for a flow from its execution context
pub type DescribeAudit = fn(&ExecutionContext) -> AppResult<AuditEntry>;

/// Post-condition appending an audit row; never fails the flow on storage errors
pub struct AppendAudit {
    trail: AuditTrail,
    describe: DescribeAudit,
}

impl AppendAudit {
    /// Post-condition recording what `describe` derives from the context
    #[must_use]
    pub fn new(trail: AuditTrail, describe: DescribeAudit) -> Self {
        Self { trail, describe }
    }
}

#[async_trait]
impl Condition for AppendAudit {
    fn name(&self) -> &'static str {
        "append_audit"
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let entry = (self.describe)(ctx)?;
        self.trail.record(entry, ray_id).await;
        Ok(Outcome::empty_success(ray_id))
    }
}
