// ABOUTME: Client secret generator contract and the default ring-backed implementation
// ABOUTME: Output is high-entropy URL-safe text; callers never depend on a concrete generator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt::Debug;

use base64::{engine::general_purpose, Engine as _};
use warden_core::errors::{AppError, AppResult};

use super::random_bytes;
use crate::constants::secrets;

/// Produces raw client secrets
///
/// `user_id` may influence how randomness is sourced (an HSM partition, a
/// KMS key handle) but must never make output reproducible or reduce its
/// entropy.
pub trait SecretGenerator: Debug + Send + Sync {
    /// Fresh raw secret for a client owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns `EntropyFailure` if the randomness source fails
    fn generate_secret(&self, user_id: &str) -> AppResult<String>;
}

/// CSPRNG-backed generator using the operating system RNG
#[derive(Debug, Clone, Copy)]
pub struct SystemSecretGenerator {
    bytes: usize,
}

impl SystemSecretGenerator {
    /// Generator producing `bytes` bytes of entropy per secret
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if `bytes` is below the 32-byte minimum
    pub fn new(bytes: usize) -> AppResult<Self> {
        if bytes < secrets::MIN_SECRET_BYTES {
            return Err(AppError::config_invalid(format!(
                "client secrets need at least {} bytes of entropy, got {bytes}",
                secrets::MIN_SECRET_BYTES
            )));
        }
        Ok(Self { bytes })
    }

    /// Bytes of entropy per secret
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Default for SystemSecretGenerator {
    fn default() -> Self {
        Self {
            bytes: secrets::MIN_SECRET_BYTES,
        }
    }
}

impl SecretGenerator for SystemSecretGenerator {
    fn generate_secret(&self, _user_id: &str) -> AppResult<String> {
        let bytes = random_bytes(self.bytes)?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use warden_core::errors::FaultCode;

    #[test]
    fn secrets_are_unique_per_call() {
        let generator = SystemSecretGenerator::default();
        let first = generator.generate_secret("user-1").unwrap();
        let second = generator.generate_secret("user-1").unwrap();
        assert_ne!(first, second);
        assert!(first.len() >= 43);
    }

    #[test]
    fn short_secrets_are_refused() {
        assert_eq!(
            SystemSecretGenerator::new(16).unwrap_err().code,
            FaultCode::ConfigInvalid
        );
        assert_eq!(SystemSecretGenerator::new(64).unwrap().bytes(), 64);
    }
}
