// ABOUTME: Client registration materialization: metadata validation, credential generation, persistence
// ABOUTME: Returns the raw client secret exactly once; only its Argon2id hash is stored
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Client Registration
//!
//! [`ClientRegistrationManager::materialize`] turns an already-authorized
//! registration request (RFC 7591 metadata) into a persisted [`ClientRecord`].
//! Whether the caller may register a client at all is decided elsewhere; the
//! `registration.*` codes returned here only describe why materialization
//! failed.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;
use warden_core::errors::{codes, AppError, AppResult, ErrorCode, StorageError};
use warden_core::models::{
    AuditStamp, ClientRecord, ClientType, GrantType, RegisteredClient, Scope,
};
use warden_core::outcome::{Outcome, RayId};
use zeroize::Zeroizing;

use crate::audit::{AuditEntry, AuditTrail};
use crate::clock::Clock;
use crate::constants::{events, secrets};
use crate::credentials::{hash_off_thread, random_token, CredentialHasher, SecretGenerator};
use crate::flows::FlowDependencies;
use crate::storage::StorageBackend;

/// Client metadata submitted for registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
    /// User that will own the client; bound into the secret hash
    pub owner_id: String,
    /// Confidential clients receive a secret
    #[serde(default)]
    pub client_type: ClientType,
    /// Human-readable name
    #[serde(default)]
    pub client_name: Option<String>,
    /// Exact redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Wire grant type names; defaults to `authorization_code`
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    /// Defaults to `code` when `authorization_code` is requested
    #[serde(default)]
    pub response_types: Option<Vec<String>>,
    /// Maximum scope the client may request
    #[serde(default)]
    pub scope: Option<String>,
    /// Optional registration expiry
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Metadata after validation
struct ValidatedMetadata {
    grant_types: Vec<GrantType>,
    response_types: Vec<String>,
}

/// Materializes validated registrations into client records
#[derive(Clone)]
pub struct ClientRegistrationManager {
    storage: Arc<dyn StorageBackend>,
    generator: Arc<dyn SecretGenerator>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl ClientRegistrationManager {
    /// Wire the manager
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        generator: Arc<dyn SecretGenerator>,
        hasher: Arc<dyn CredentialHasher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let audit = AuditTrail::new(Arc::clone(&storage), Arc::clone(&clock));
        Self {
            storage,
            generator,
            hasher,
            clock,
            audit,
        }
    }

    /// Manager sharing the storage, generator, hasher, and clock of `deps`
    #[must_use]
    pub fn from_dependencies(deps: &FlowDependencies) -> Self {
        Self::new(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.generator),
            Arc::clone(&deps.hasher),
            Arc::clone(&deps.clock),
        )
    }

    /// Register a client
    ///
    /// Success payload is the serialized [`RegisteredClient`], the only place
    /// the raw secret ever appears.
    ///
    /// # Errors
    ///
    /// Infrastructure faults: entropy failure while drawing the client id,
    /// storage unreachable while inserting or reading back
    pub async fn materialize(
        &self,
        request: ClientRegistrationRequest,
        actor: &str,
        ray_id: &RayId,
    ) -> AppResult<Outcome> {
        let metadata = match validate_metadata(&request) {
            Ok(metadata) => metadata,
            Err((code, message)) => {
                warn!(ray_id = %ray_id, error_code = %code, %message, "registration rejected");
                return Ok(Outcome::failed(code, message, ray_id));
            }
        };

        let client_id = format!(
            "{}{}",
            secrets::CLIENT_ID_PREFIX,
            random_token(secrets::CLIENT_ID_BYTES)?
        );

        let (raw_secret, secret_hash) = if request.client_type == ClientType::Confidential {
            let secret = match self.generator.generate_secret(&request.owner_id) {
                Ok(secret) => Zeroizing::new(secret),
                Err(e) => {
                    warn!(ray_id = %ray_id, error = %e, "secret generation failed");
                    return Ok(failure(
                        codes::registration::SECRET_GENERATION_FAILED,
                        "could not generate a client secret",
                        ray_id,
                    ));
                }
            };
            let hash = match hash_off_thread(
                Arc::clone(&self.hasher),
                secret.clone(),
                request.owner_id.clone(),
                client_id.clone(),
            )
            .await
            {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(ray_id = %ray_id, error = %e, "secret hashing failed");
                    return Ok(failure(
                        codes::registration::SECRET_HASHING_FAILED,
                        "could not hash the client secret",
                        ray_id,
                    ));
                }
            };
            (Some(secret), Some(hash))
        } else {
            (None, None)
        };

        let now = self.clock.now();
        let record = ClientRecord {
            id: Uuid::new_v4(),
            client_id: client_id.clone(),
            client_type: request.client_type,
            client_secret_hash: secret_hash,
            owner_id: request.owner_id.clone(),
            client_name: request.client_name.clone(),
            redirect_uris: request.redirect_uris.clone(),
            grant_types: metadata.grant_types,
            response_types: metadata.response_types,
            scope: Scope::parse(request.scope.as_deref()),
            enabled: true,
            expires_at: request.expires_at,
            stamp: AuditStamp::new(now, actor),
        };

        if let Some(outcome) = self.insert(&record, ray_id).await? {
            return Ok(outcome);
        }

        let stored = {
            let mut tx = self.storage.begin().await?;
            tx.clients().get_by_natural_key(&client_id).await?
        };
        if stored.as_ref() != Some(&record) {
            error!(ray_id = %ray_id, client_id, "client record did not read back after commit");
            return Ok(failure(
                codes::registration::PERSISTENCE_FAILED,
                "client registration was not persisted",
                ray_id,
            ));
        }

        info!(ray_id = %ray_id, client_id, client_type = ?record.client_type, "client registered");
        self.audit
            .record(
                AuditEntry::new(events::CLIENT_REGISTERED, actor)
                    .client(&record.client_id)
                    .user(&record.owner_id)
                    .detail("confidential", record.is_confidential()),
                ray_id,
            )
            .await;

        let registered = RegisteredClient::from_record(
            &record,
            raw_secret.as_ref().map(|secret| secret.as_str().to_owned()),
        );
        let payload = serde_json::to_value(registered)
            .map_err(|e| AppError::internal("cannot serialize registered client").with_source(e))?;
        Ok(Outcome::success(payload, ray_id))
    }

    /// Insert and commit; `Some` carries the failure to return
    async fn insert(&self, record: &ClientRecord, ray_id: &RayId) -> AppResult<Option<Outcome>> {
        let mut tx = self.storage.begin().await?;
        match tx.clients().insert(record.clone()).await {
            Ok(()) => {}
            Err(StorageError::Duplicate { .. }) => {
                warn!(ray_id = %ray_id, client_id = %record.client_id, "client id already registered");
                return Ok(Some(failure(
                    codes::registration::CONFLICT,
                    "a client with this identifier already exists",
                    ray_id,
                )));
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = tx.commit().await {
            error!(ray_id = %ray_id, client_id = %record.client_id, error = %e, "client registration commit failed");
            return Ok(Some(failure(
                codes::registration::PERSISTENCE_FAILED,
                "client registration was not persisted",
                ray_id,
            )));
        }
        Ok(None)
    }
}

fn failure(code: ErrorCode, message: &str, ray_id: &RayId) -> Outcome {
    Outcome::failed(code, message, ray_id)
}

type MetadataResult<T> = Result<T, (ErrorCode, String)>;

fn invalid_metadata(message: impl Into<String>) -> (ErrorCode, String) {
    (codes::registration::INVALID_CLIENT_METADATA, message.into())
}

fn validate_metadata(request: &ClientRegistrationRequest) -> MetadataResult<ValidatedMetadata> {
    if request.owner_id.trim().is_empty() {
        return Err(invalid_metadata("owner_id is required"));
    }

    let grant_types = match &request.grant_types {
        None => vec![GrantType::AuthorizationCode],
        Some(names) if names.is_empty() => {
            return Err(invalid_metadata("grant_types must not be empty"))
        }
        Some(names) => names
            .iter()
            .map(|name| {
                GrantType::from_str(name)
                    .map_err(|_| invalid_metadata(format!("unsupported grant_type: {name}")))
            })
            .collect::<MetadataResult<Vec<_>>>()?,
    };

    if request.client_type == ClientType::Public && grant_types.contains(&GrantType::ClientCredentials)
    {
        return Err(invalid_metadata(
            "public clients cannot use client_credentials",
        ));
    }

    let uses_code = grant_types.contains(&GrantType::AuthorizationCode);
    let response_types = request
        .response_types
        .clone()
        .unwrap_or_else(|| if uses_code { vec!["code".to_owned()] } else { Vec::new() });
    if let Some(unsupported) = response_types.iter().find(|r| r.as_str() != "code") {
        return Err(invalid_metadata(format!(
            "unsupported response_type: {unsupported}"
        )));
    }
    if uses_code != response_types.iter().any(|r| r == "code") {
        return Err(invalid_metadata(
            "response_type code and grant type authorization_code must be registered together",
        ));
    }

    if uses_code && request.redirect_uris.is_empty() {
        return Err((
            codes::registration::INVALID_REDIRECT_URI,
            "at least one redirect_uri is required".to_owned(),
        ));
    }
    if let Some(rejected) = request.redirect_uris.iter().find(|uri| !is_valid_redirect_uri(uri)) {
        return Err((
            codes::registration::INVALID_REDIRECT_URI,
            format!("invalid redirect_uri: {rejected}"),
        ));
    }

    Ok(ValidatedMetadata {
        grant_types,
        response_types,
    })
}

/// Absolute, no fragment or wildcard, https or loopback http
#[must_use]
pub fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.trim().is_empty() || uri.contains('#') || uri.contains('*') {
        return false;
    }
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };
    if parsed.cannot_be_a_base() || parsed.fragment().is_some() {
        return false;
    }
    match parsed.scheme() {
        "https" => parsed.host_str().is_some(),
        "http" => matches!(
            parsed.host_str(),
            Some("localhost" | "127.0.0.1" | "[::1]")
        ),
        _ => false,
    }
}
