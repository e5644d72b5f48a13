// ABOUTME: In-process storage backend implementing the transaction and table contracts
// ABOUTME: Serializes transactions behind one async mutex and applies writes only on commit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Reference backend used by tests, the CLI, and embedders that do not need
//! durability. A transaction clones the committed tables into a working set
//! while holding the global lock; commit swaps the working set in. A dropped
//! transaction releases the lock and its working set is discarded.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::errors::StorageError;
use warden_core::models::{
    AccessToken, AuditRecord, AuthorizationCode, ClientRecord, DeviceCode, RefreshToken,
};

use super::{AuditLog, Record, RecordFilter, StorageBackend, StorageResult, Table, Transaction};

#[derive(Debug, Clone)]
struct MemoryTable<R> {
    rows: BTreeMap<Uuid, R>,
}

impl<R> Default for MemoryTable<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<R: Record> MemoryTable<R> {
    fn key_taken_by_other(&self, record: &R) -> bool {
        self.rows
            .values()
            .any(|row| row.id() != record.id() && row.natural_key() == record.natural_key())
    }
}

#[async_trait]
impl<R: Record> Table<R> for MemoryTable<R> {
    async fn insert(&mut self, record: R) -> StorageResult<()> {
        if self.rows.contains_key(&record.id()) || self.key_taken_by_other(&record) {
            return Err(StorageError::Duplicate { kind: R::KIND });
        }
        self.rows.insert(record.id(), record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<R>> {
        Ok(self.rows.get(&id).cloned())
    }

    async fn get_by_natural_key(&self, key: &str) -> StorageResult<Option<R>> {
        Ok(self
            .rows
            .values()
            .find(|row| row.natural_key() == key)
            .cloned())
    }

    async fn update(&mut self, record: R) -> StorageResult<()> {
        if !self.rows.contains_key(&record.id()) {
            return Err(StorageError::NotFound {
                kind: R::KIND,
                id: record.id().to_string(),
            });
        }
        if self.key_taken_by_other(&record) {
            return Err(StorageError::Duplicate { kind: R::KIND });
        }
        self.rows.insert(record.id(), record);
        Ok(())
    }

    async fn delete(&mut self, id: Uuid) -> StorageResult<()> {
        self.rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                kind: R::KIND,
                id: id.to_string(),
            })
    }

    async fn list(&self, filter: &RecordFilter) -> StorageResult<Vec<R>> {
        Ok(self
            .rows
            .values()
            .filter(|row| row.matches(filter))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryAuditLog {
    rows: Vec<AuditRecord>,
    fail_next_append: Arc<AtomicBool>,
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&mut self, record: AuditRecord) -> StorageResult<()> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            warn!("in-memory audit append failure injected");
            return Err(StorageError::Unavailable("audit log unreachable".into()));
        }
        if self.rows.iter().any(|row| row.id == record.id) {
            return Err(StorageError::AppendOnly);
        }
        self.rows.push(record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<AuditRecord>> {
        Ok(self.rows.iter().find(|row| row.id == id).cloned())
    }

    async fn list_by_ray_id(&self, ray_id: &str) -> StorageResult<Vec<AuditRecord>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.ray_id == ray_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    clients: MemoryTable<ClientRecord>,
    access_tokens: MemoryTable<AccessToken>,
    refresh_tokens: MemoryTable<RefreshToken>,
    authorization_codes: MemoryTable<AuthorizationCode>,
    device_codes: MemoryTable<DeviceCode>,
    audit_log: MemoryAuditLog,
}

/// In-memory [`StorageBackend`] with serializable transactions
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    committed: Arc<Mutex<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
    fail_next_audit_append: Arc<AtomicBool>,
}

impl InMemoryStorage {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `Unavailable` without applying anything
    ///
    /// Simulates the process dying between staging writes and making them
    /// durable.
    pub fn arm_commit_failure(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next audit append fail with `Unavailable`
    ///
    /// Other tables are unaffected, so the operation being audited still
    /// commits.
    pub fn arm_audit_failure(&self) {
        self.fail_next_audit_append.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.committed).lock_owned().await;
        let mut working = guard.clone();
        working.audit_log.fail_next_append = Arc::clone(&self.fail_next_audit_append);
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            fail_commit: Arc::clone(&self.fail_next_commit),
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn clients(&mut self) -> &mut dyn Table<ClientRecord> {
        &mut self.working.clients
    }

    fn access_tokens(&mut self) -> &mut dyn Table<AccessToken> {
        &mut self.working.access_tokens
    }

    fn refresh_tokens(&mut self) -> &mut dyn Table<RefreshToken> {
        &mut self.working.refresh_tokens
    }

    fn authorization_codes(&mut self) -> &mut dyn Table<AuthorizationCode> {
        &mut self.working.authorization_codes
    }

    fn device_codes(&mut self) -> &mut dyn Table<DeviceCode> {
        &mut self.working.device_codes
    }

    fn audit_log(&mut self) -> &mut dyn AuditLog {
        &mut self.working.audit_log
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let Self {
            mut guard,
            working,
            fail_commit,
        } = *self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            warn!("in-memory commit failure injected; discarding staged writes");
            return Err(StorageError::Unavailable(
                "commit interrupted before completion".into(),
            ));
        }
        *guard = working;
        debug!("in-memory transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::{Duration, Utc};
    use warden_core::models::{AuditStamp, Scope};

    fn access_token(client_id: &str, digest: &str) -> AccessToken {
        let now = Utc::now();
        AccessToken {
            id: Uuid::new_v4(),
            token_digest: digest.into(),
            client_id: client_id.into(),
            user_id: Some("user-1".into()),
            refresh_token_id: None,
            scope: Scope::parse(Some("read")),
            expires_at: now + Duration::hours(1),
            revoked_at: None,
            stamp: AuditStamp::new(now, "test"),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let storage = InMemoryStorage::new();
        {
            let mut tx = storage.begin().await.unwrap();
            tx.access_tokens()
                .insert(access_token("c1", "d1"))
                .await
                .unwrap();
        }
        let mut tx = storage.begin().await.unwrap();
        assert!(tx
            .access_tokens()
            .get_by_natural_key("d1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let storage = InMemoryStorage::new();
        let token = access_token("c1", "d1");
        let mut tx = storage.begin().await.unwrap();
        tx.access_tokens().insert(token.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.access_tokens().get(token.id).await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn armed_failure_applies_nothing() {
        let storage = InMemoryStorage::new();
        storage.arm_commit_failure();
        let mut tx = storage.begin().await.unwrap();
        tx.access_tokens()
            .insert(access_token("c1", "d1"))
            .await
            .unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));

        let mut tx = storage.begin().await.unwrap();
        assert!(tx
            .access_tokens()
            .list(&RecordFilter::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn armed_audit_failure_hits_only_the_next_append() {
        let storage = InMemoryStorage::new();
        storage.arm_audit_failure();
        let record = |ray_id: &str| AuditRecord {
            id: Uuid::new_v4(),
            ray_id: ray_id.into(),
            event: "test.event".into(),
            client_id: None,
            user_id: None,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
            created_by: "test".into(),
        };

        let mut tx = storage.begin().await.unwrap();
        let err = tx.audit_log().append(record("r1")).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        tx.access_tokens()
            .insert(access_token("c1", "d1"))
            .await
            .unwrap();
        tx.audit_log().append(record("r2")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        assert!(tx.audit_log().list_by_ray_id("r1").await.unwrap().is_empty());
        assert_eq!(tx.audit_log().list_by_ray_id("r2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn natural_keys_are_unique() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        tx.access_tokens()
            .insert(access_token("c1", "same"))
            .await
            .unwrap();
        let err = tx
            .access_tokens()
            .insert(access_token("c2", "same"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { kind: "access_token" }));
    }

    #[tokio::test]
    async fn update_requires_existing_row() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let err = tx
            .access_tokens()
            .update(access_token("c1", "d1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_client_and_activity() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        let mut revoked = access_token("c1", "d2");
        revoked.revoked_at = Some(now);

        let mut tx = storage.begin().await.unwrap();
        tx.access_tokens()
            .insert(access_token("c1", "d1"))
            .await
            .unwrap();
        tx.access_tokens().insert(revoked).await.unwrap();
        tx.access_tokens()
            .insert(access_token("c2", "d3"))
            .await
            .unwrap();

        let active = tx
            .access_tokens()
            .list(&RecordFilter::new().client("c1").active_at(now))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token_digest, "d1");
    }
}
