// ABOUTME: Grant-agnostic storage contracts: per-kind tables, append-only audit log, transactions
// ABOUTME: Business intent (rotate, redeem, evict) is composed by flows from these primitives
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Storage Contracts
//!
//! Embedders supply a [`StorageBackend`]. Every multi-row operation a flow
//! performs (refresh rotation, code redemption, FIFO eviction with issuance)
//! happens inside one [`Transaction`]: either [`Transaction::commit`] makes all
//! staged writes visible at once, or dropping the transaction discards them.
//!
//! Tables expose only insert, get by id, get by natural key, full-record
//! update, delete, and one filtered listing. There is deliberately no
//! `rotate`, `redeem`, or `evict`.

/// In-process reference backend
pub mod memory;
/// `Record` implementations for the persisted models
pub mod records;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use warden_core::errors::StorageError;
use warden_core::models::{
    AccessToken, AuditRecord, AuthorizationCode, ClientRecord, DeviceCode, RefreshToken,
};

pub use memory::InMemoryStorage;

/// Result alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A row kind stored in a [`Table`]
pub trait Record: Clone + Send + Sync + 'static {
    /// Entity kind used in errors and logs
    const KIND: &'static str;

    /// Internal primary key
    fn id(&self) -> Uuid;

    /// Unique lookup key (client id, token digest, code digest)
    fn natural_key(&self) -> &str;

    /// Creation time, used for FIFO ordering
    fn created_at(&self) -> DateTime<Utc>;

    /// `true` if the row satisfies every field set on `filter`
    fn matches(&self, filter: &RecordFilter) -> bool;
}

/// Grant-agnostic listing filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Owning client
    pub client_id: Option<String>,
    /// Resource owner; `Some(None)` matches rows without a user
    pub user_id: Option<Option<String>>,
    /// Parent refresh token of an access token
    pub refresh_token_id: Option<Uuid>,
    /// Only rows that are neither revoked nor expired at this instant
    pub active_at: Option<DateTime<Utc>>,
    /// Secondary unique key (device user code)
    pub alternate_key: Option<String>,
}

impl RecordFilter {
    /// Filter matching every row
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one client
    #[must_use]
    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Restrict to one user, or to rows without a user
    #[must_use]
    pub fn user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = Some(user_id.map(str::to_owned));
        self
    }

    /// Restrict to access tokens issued under one refresh token
    #[must_use]
    pub fn refresh_token(mut self, refresh_token_id: Uuid) -> Self {
        self.refresh_token_id = Some(refresh_token_id);
        self
    }

    /// Restrict to rows active at `now`
    #[must_use]
    pub fn active_at(mut self, now: DateTime<Utc>) -> Self {
        self.active_at = Some(now);
        self
    }

    /// Restrict to one alternate key
    #[must_use]
    pub fn alternate_key(mut self, key: impl Into<String>) -> Self {
        self.alternate_key = Some(key.into());
        self
    }
}

/// Generic per-kind table
#[async_trait]
pub trait Table<R: Record>: Send + Sync {
    /// Insert a new row; `Duplicate` if the id or natural key is taken
    async fn insert(&mut self, record: R) -> StorageResult<()>;

    /// Row by primary key
    async fn get(&self, id: Uuid) -> StorageResult<Option<R>>;

    /// Row by natural key
    async fn get_by_natural_key(&self, key: &str) -> StorageResult<Option<R>>;

    /// Replace the whole row with the same id; `NotFound` if absent
    async fn update(&mut self, record: R) -> StorageResult<()>;

    /// Remove a row; `NotFound` if absent
    async fn delete(&mut self, id: Uuid) -> StorageResult<()>;

    /// Rows matching `filter`, in no particular order
    async fn list(&self, filter: &RecordFilter) -> StorageResult<Vec<R>>;
}

/// Append-only audit log; rows can never be updated or deleted through it
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one row
    async fn append(&mut self, record: AuditRecord) -> StorageResult<()>;

    /// Row by primary key
    async fn get(&self, id: Uuid) -> StorageResult<Option<AuditRecord>>;

    /// Every row written under `ray_id`, oldest first
    async fn list_by_ray_id(&self, ray_id: &str) -> StorageResult<Vec<AuditRecord>>;
}

/// Unit of atomic work across every table
///
/// Backends must isolate transactions serializably for the rows they touch.
/// Dropping a transaction without committing discards every staged write.
#[async_trait]
pub trait Transaction: Send {
    /// Client records
    fn clients(&mut self) -> &mut dyn Table<ClientRecord>;

    /// Access tokens
    fn access_tokens(&mut self) -> &mut dyn Table<AccessToken>;

    /// Refresh tokens
    fn refresh_tokens(&mut self) -> &mut dyn Table<RefreshToken>;

    /// Authorization codes
    fn authorization_codes(&mut self) -> &mut dyn Table<AuthorizationCode>;

    /// Device codes
    fn device_codes(&mut self) -> &mut dyn Table<DeviceCode>;

    /// Audit log
    fn audit_log(&mut self) -> &mut dyn AuditLog;

    /// Make every staged write visible at once
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}

/// Entry point supplied by the embedder
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Start a transaction
    async fn begin(&self) -> StorageResult<Box<dyn Transaction>>;
}

/// SHA-256 hex digest of a token-like secret
///
/// Tokens and codes are high-entropy, so a fast digest is enough to keep raw
/// values out of storage while still allowing natural-key lookups.
#[must_use]
pub fn secret_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
