// ABOUTME: Client secret rotation composed from the generic client table, generator, and hasher
// ABOUTME: Stored state changes only at the final full-record update; the new secret is returned once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use warden_core::errors::{codes, AppResult};
use warden_core::outcome::{Outcome, RayId};
use zeroize::Zeroizing;

use super::{hash_off_thread, verify_off_thread, CredentialHasher, SecretGenerator};
use crate::audit::{AuditEntry, AuditTrail};
use crate::clock::Clock;
use crate::constants::events;
use crate::flows::FlowDependencies;
use crate::storage::StorageBackend;

/// Caller input for a rotation
#[derive(Clone)]
pub struct RotateSecretRequest {
    /// Client whose secret is rotated
    pub client_id: String,
    /// Secret the caller currently holds
    pub current_secret: Zeroizing<String>,
    /// Who is performing the rotation, recorded in audit fields
    pub actor: String,
}

/// Rotates confidential client secrets
///
/// Depends only on the generic client table, a [`SecretGenerator`], and a
/// [`CredentialHasher`]; there is no rotation-specific storage method.
#[derive(Clone)]
pub struct SecretRotationService {
    storage: Arc<dyn StorageBackend>,
    generator: Arc<dyn SecretGenerator>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl SecretRotationService {
    /// Wire the service
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

    /// Service sharing the storage, generator, hasher, and clock of `deps`
    #[must_use]
    pub fn from_dependencies(deps: &FlowDependencies) -> Self {
        Self::new(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.generator),
            Arc::clone(&deps.hasher),
            Arc::clone(&deps.clock),
        )
    }

    /// Rotate a client secret
    ///
    /// Success payload: `{"client_id", "client_secret"}`. The raw secret
    /// appears nowhere else.
    ///
    /// # Errors
    ///
    /// Infrastructure faults only: storage unavailable or hashing task failure
    pub async fn rotate(&self, request: RotateSecretRequest, ray_id: &RayId) -> AppResult<Outcome> {
        let RotateSecretRequest {
            client_id,
            current_secret,
            actor,
        } = request;

        let loaded = {
            let mut tx = self.storage.begin().await?;
            tx.clients().get_by_natural_key(&client_id).await?
        };
        let Some(client) = loaded.filter(|c| c.enabled && !c.is_expired(self.clock.now())) else {
            warn!(ray_id = %ray_id, client_id, "rotation requested for unknown or disabled client");
            return Ok(Outcome::failed(
                codes::oauth::INVALID_CLIENT,
                "client authentication failed",
                ray_id,
            ));
        };
        let Some(stored_hash) = client.client_secret_hash.clone().filter(|_| client.is_confidential())
        else {
            return Ok(Outcome::failed(
                codes::oauth::UNAUTHORIZED_CLIENT,
                "public clients have no secret to rotate",
                ray_id,
            ));
        };

        let verified = verify_off_thread(
            Arc::clone(&self.hasher),
            current_secret,
            stored_hash,
            client.owner_id.clone(),
            client.client_id.clone(),
        )
        .await?;
        if !verified {
            warn!(ray_id = %ray_id, client_id, "rotation rejected: current secret mismatch");
            return Ok(Outcome::failed(
                codes::oauth::INVALID_CLIENT,
                "client authentication failed",
                ray_id,
            ));
        }

        let new_secret = match self.generator.generate_secret(&client.owner_id) {
            Ok(secret) => Zeroizing::new(secret),
            Err(e) => {
                warn!(ray_id = %ray_id, client_id, error = %e, "secret generation failed");
                return Ok(Outcome::failed(
                    codes::registration::SECRET_GENERATION_FAILED,
                    "could not generate a new client secret",
                    ray_id,
                ));
            }
        };

        let new_hash = match hash_off_thread(
            Arc::clone(&self.hasher),
            new_secret.clone(),
            client.owner_id.clone(),
            client.client_id.clone(),
        )
        .await
        {
            Ok(hash) => hash,
            Err(e) => {
                warn!(ray_id = %ray_id, client_id, error = %e, "secret hashing failed");
                return Ok(Outcome::failed(
                    codes::registration::SECRET_HASHING_FAILED,
                    "could not hash the new client secret",
                    ray_id,
                ));
            }
        };

        let mut tx = self.storage.begin().await?;
        let current = tx.clients().get(client.id).await?;
        if current.as_ref() != Some(&client) {
            warn!(ray_id = %ray_id, client_id, "client changed concurrently; rotation aborted");
            return Ok(Outcome::failed(
                codes::registration::CONFLICT,
                "client was modified concurrently; retry the rotation",
                ray_id,
            ));
        }
        let mut updated = client;
        updated.client_secret_hash = Some(new_hash);
        updated.stamp.touch(self.clock.now(), actor.as_str());
        tx.clients().update(updated.clone()).await?;
        tx.commit().await?;

        info!(ray_id = %ray_id, client_id, "client secret rotated");
        self.audit
            .record(
                AuditEntry::new(events::CLIENT_SECRET_ROTATED, actor)
                    .client(&updated.client_id)
                    .user(&updated.owner_id),
                ray_id,
            )
            .await;

        Ok(Outcome::success(
            json!({
                "client_id": updated.client_id,
                "client_secret": new_secret.as_str(),
            }),
            ray_id,
        ))
    }
}
