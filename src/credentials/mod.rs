// ABOUTME: Client secret generation, password hashing, secret rotation, and random token helpers
// ABOUTME: Hashing runs on the blocking pool so Argon2 never stalls the async scheduler
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Secret generator contract and the ring-backed default
pub mod generator;
/// Credential hasher contract and the Argon2id default
pub mod hasher;
/// Secret rotation orchestration
pub mod rotation;

pub use generator::{SecretGenerator, SystemSecretGenerator};
pub use hasher::{Argon2CredentialHasher, CredentialHasher};
pub use rotation::{RotateSecretRequest, SecretRotationService};

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use tokio::task;
use tracing::error;
use warden_core::errors::{AppError, AppResult};
use zeroize::Zeroizing;

use crate::constants::user_code;

/// Fill `len` bytes from the system CSPRNG
///
/// # Errors
///
/// Returns `EntropyFailure` if the operating system RNG fails
pub fn random_bytes(len: usize) -> AppResult<Zeroizing<Vec<u8>>> {
    let mut bytes = Zeroizing::new(vec![0_u8; len]);
    SystemRandom::new().fill(&mut bytes).map_err(|e| {
        error!(error = ?e, "system RNG failure; cannot generate secure random bytes");
        AppError::entropy("system RNG failure")
    })?;
    Ok(bytes)
}

/// URL-safe, unpadded base64 of `len` random bytes
///
/// Used for access tokens, refresh tokens, authorization codes, and device codes.
///
/// # Errors
///
/// Returns `EntropyFailure` if the operating system RNG fails
pub fn random_token(len: usize) -> AppResult<String> {
    let bytes = random_bytes(len)?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes.as_slice()))
}

/// Human-typable device user code in `XXXX-XXXX` form (RFC 8628 §6.1)
///
/// Bytes are drawn by rejection sampling so every alphabet character is
/// equally likely.
///
/// # Errors
///
/// Returns `EntropyFailure` if the operating system RNG fails
pub fn random_user_code() -> AppResult<String> {
    let alphabet_len = user_code::ALPHABET.len();
    let accept_below = 256 - (256 % alphabet_len);
    let mut chars = Vec::with_capacity(user_code::GROUP_LEN * 2);

    while chars.len() < user_code::GROUP_LEN * 2 {
        for byte in random_bytes(16)?.iter().map(|b| usize::from(*b)) {
            if byte < accept_below && chars.len() < user_code::GROUP_LEN * 2 {
                chars.push(char::from(user_code::ALPHABET[byte % alphabet_len]));
            }
        }
    }

    let (first, second) = chars.split_at(user_code::GROUP_LEN);
    Ok(format!(
        "{}-{}",
        first.iter().collect::<String>(),
        second.iter().collect::<String>()
    ))
}

/// Canonical form of a user-typed code: uppercase, separators ignored
#[must_use]
pub fn normalize_user_code(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.len() == user_code::GROUP_LEN * 2 {
        format!(
            "{}-{}",
            &compact[..user_code::GROUP_LEN],
            &compact[user_code::GROUP_LEN..]
        )
    } else {
        compact
    }
}

/// Hash a secret on the blocking thread pool
///
/// # Errors
///
/// Returns the hasher's fault, or an internal fault if the task panicked
pub async fn hash_off_thread(
    hasher: Arc<dyn CredentialHasher>,
    secret: Zeroizing<String>,
    user_id: String,
    client_id: String,
) -> AppResult<String> {
    task::spawn_blocking(move || hasher.hash(&secret, &user_id, &client_id))
        .await
        .map_err(|e| AppError::internal(format!("secret hashing task failed: {e}")))?
}

/// Verify a secret on the blocking thread pool
///
/// # Errors
///
/// Returns an internal fault only if the task panicked; mismatches and
/// malformed hashes are `Ok(false)`
pub async fn verify_off_thread(
    hasher: Arc<dyn CredentialHasher>,
    secret: Zeroizing<String>,
    stored_hash: String,
    user_id: String,
    client_id: String,
) -> AppResult<bool> {
    task::spawn_blocking(move || hasher.verify(&secret, &stored_hash, &user_id, &client_id))
        .await
        .map_err(|e| AppError::internal(format!("secret verification task failed: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn tokens_are_url_safe_and_distinct() {
        let a = random_token(32).unwrap();
        let b = random_token(32).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn user_codes_use_the_unambiguous_alphabet() {
        let code = random_user_code().unwrap();
        assert_eq!(code.len(), 9);
        assert_eq!(code.as_bytes()[4], b'-');
        assert!(code
            .bytes()
            .filter(|b| *b != b'-')
            .all(|b| user_code::ALPHABET.contains(&b)));
    }

    #[test]
    fn user_code_normalization_ignores_case_and_separators() {
        assert_eq!(normalize_user_code("bcdf ghjk"), "BCDF-GHJK");
        assert_eq!(normalize_user_code("BCDF-GHJK"), "BCDF-GHJK");
        assert_eq!(normalize_user_code("abc"), "ABC");
    }
}
