// ABOUTME: Client secret commands for warden-cli
// ABOUTME: Generate, hash, and verify secrets using the same services the flows use
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::{self, AsyncReadExt};
use tracing::info;
use warden::codes;
use warden::config::OAuth2Config;
use warden::credentials::{
    hash_off_thread, verify_off_thread, Argon2CredentialHasher, CredentialHasher, SecretGenerator,
    SystemSecretGenerator,
};
use zeroize::Zeroizing;

use crate::helpers::display::{display_generated_secret, display_verification};

/// Generate and print a secret of `bytes` random bytes
pub fn generate(bytes: usize) -> anyhow::Result<()> {
    let generator = SystemSecretGenerator::new(bytes)?;
    let secret = Zeroizing::new(generator.generate_secret("cli")?);
    display_generated_secret(&secret, generator.bytes());
    Ok(())
}

/// Hash the secret on stdin and print the PHC string
pub async fn hash(user: &str, client: &str) -> anyhow::Result<()> {
    let secret = read_secret().await?;
    let stored = hash_off_thread(hasher()?, secret, user.to_owned(), client.to_owned()).await?;
    info!(user, client, "secret hashed");
    println!("{stored}");
    Ok(())
}

/// Verify the secret on stdin; exits non-zero on mismatch
pub async fn verify(user: &str, client: &str, stored_hash: &str) -> anyhow::Result<()> {
    let secret = read_secret().await?;
    let hasher = hasher()?;
    let verified = verify_off_thread(
        Arc::clone(&hasher),
        secret,
        stored_hash.to_owned(),
        user.to_owned(),
        client.to_owned(),
    )
    .await?;

    display_verification(verified, (!verified).then_some(codes::oauth::INVALID_CLIENT));
    if !verified {
        bail!("secret verification failed");
    }
    if hasher.needs_rehash(stored_hash) {
        println!("note: stored hash uses outdated parameters; re-hash on next rotation");
    }
    Ok(())
}

fn hasher() -> anyhow::Result<Arc<dyn CredentialHasher>> {
    let config = OAuth2Config::from_env().context("loading WARDEN_* configuration")?;
    Ok(Arc::new(Argon2CredentialHasher::new(config.argon2)?))
}

async fn read_secret() -> anyhow::Result<Zeroizing<String>> {
    let mut raw = Zeroizing::new(String::new());
    io::stdin()
        .read_to_string(&mut *raw)
        .await
        .context("reading secret from stdin")?;
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        bail!("no secret provided on stdin");
    }
    Ok(Zeroizing::new(trimmed.to_owned()))
}
