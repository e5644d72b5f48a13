// ABOUTME: Credential hasher contract and the Argon2id implementation with client binding
// ABOUTME: Hashes are self-describing PHC strings; malformed input verifies to false
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt::Debug;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::{debug, error};
use warden_core::errors::{AppError, AppResult};
use zeroize::Zeroizing;

use super::random_bytes;
use crate::config::Argon2Settings;

const SALT_BYTES: usize = 16;

/// One-way, slow hashing of client secrets
///
/// `user_id` and `client_id` are bound into the hashed material so a stored
/// hash copied onto another client never verifies there.
pub trait CredentialHasher: Debug + Send + Sync {
    /// Self-describing hash of `secret`
    ///
    /// # Errors
    ///
    /// Returns `CryptoFailure` or `EntropyFailure` if hashing cannot proceed
    fn hash(&self, secret: &str, user_id: &str, client_id: &str) -> AppResult<String>;

    /// Constant-time check of `secret` against `stored_hash`
    ///
    /// Returns `false`, never an error, for mismatches and malformed hashes.
    fn verify(&self, secret: &str, stored_hash: &str, user_id: &str, client_id: &str) -> bool;

    /// `true` if `stored_hash` was produced with weaker or different parameters
    fn needs_rehash(&self, stored_hash: &str) -> bool;
}

/// Argon2id hasher producing PHC strings
#[derive(Debug, Clone)]
pub struct Argon2CredentialHasher {
    params: Params,
}

impl Argon2CredentialHasher {
    /// Hasher with explicit cost parameters
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if Argon2 rejects the parameters
    pub fn new(settings: Argon2Settings) -> AppResult<Self> {
        let params = Params::new(
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
            None,
        )
        .map_err(|e| AppError::config_invalid(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// `len(user_id) || user_id || len(client_id) || client_id || secret`
    ///
    /// Length prefixes keep `("ab", "c")` and `("a", "bc")` distinct.
    fn bound_material(secret: &str, user_id: &str, client_id: &str) -> Zeroizing<Vec<u8>> {
        let mut material =
            Zeroizing::new(Vec::with_capacity(16 + user_id.len() + client_id.len() + secret.len()));
        for part in [user_id, client_id] {
            material.extend_from_slice(&(part.len() as u64).to_be_bytes());
            material.extend_from_slice(part.as_bytes());
        }
        material.extend_from_slice(secret.as_bytes());
        material
    }
}

impl Default for Argon2CredentialHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl CredentialHasher for Argon2CredentialHasher {
    fn hash(&self, secret: &str, user_id: &str, client_id: &str) -> AppResult<String> {
        let salt_bytes = random_bytes(SALT_BYTES)?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::crypto(format!("salt encoding failed: {e}")))?;
        let material = Self::bound_material(secret, user_id, client_id);

        let hash = self
            .argon2()
            .hash_password(&material, &salt)
            .map_err(|e| {
                error!(client_id, "argon2 hashing failed: {e}");
                AppError::crypto(format!("argon2 hashing failed: {e}"))
            })?;
        Ok(hash.to_string())
    }

    fn verify(&self, secret: &str, stored_hash: &str, user_id: &str, client_id: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            debug!(client_id, "stored credential hash is not a PHC string");
            return false;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            debug!(client_id, algorithm = %parsed.algorithm, "foreign credential hash algorithm");
            return false;
        }
        let material = Self::bound_material(secret, user_id, client_id);
        Argon2::default().verify_password(&material, &parsed).is_ok()
    }

    fn needs_rehash(&self, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }
        Params::try_from(&parsed).map_or(true, |stored| {
            stored.m_cost() < self.params.m_cost()
                || stored.t_cost() < self.params.t_cost()
                || stored.p_cost() != self.params.p_cost()
        })
    }
}
