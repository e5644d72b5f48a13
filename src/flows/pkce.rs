// ABOUTME: PKCE (RFC 7636) challenge validation at authorization and verifier checks at redemption
// ABOUTME: Only S256 is supported; verifiers are compared in constant time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::constants::pkce;

/// Why a PKCE value was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkceRejection {
    /// Length outside 43..=128
    Length,
    /// Character outside the unreserved set
    Charset,
    /// Verifier does not hash to the stored challenge
    Mismatch,
}

impl PkceRejection {
    /// Client-facing explanation
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Length => "PKCE value must be between 43 and 128 characters",
            Self::Charset => "PKCE value may only contain [A-Z] [a-z] [0-9] - . _ ~",
            Self::Mismatch => "code_verifier does not match code_challenge",
        }
    }
}

/// Check length and character set shared by challenges and verifiers
///
/// # Errors
///
/// Returns the first rule the value breaks
pub fn check_format(value: &str) -> Result<(), PkceRejection> {
    if !(pkce::MIN_LENGTH..=pkce::MAX_LENGTH).contains(&value.len()) {
        return Err(PkceRejection::Length);
    }
    if !value
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(PkceRejection::Charset);
    }
    Ok(())
}

/// S256 transform: `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Verify `verifier` against a stored S256 `challenge`
///
/// # Errors
///
/// Returns why the verifier was rejected
pub fn verify_s256(verifier: &str, challenge: &str) -> Result<(), PkceRejection> {
    check_format(verifier)?;
    let computed = s256_challenge(verifier);
    if bool::from(computed.as_bytes().ct_eq(challenge.as_bytes())) {
        Ok(())
    } else {
        Err(PkceRejection::Mismatch)
    }
}
