// ABOUTME: Warden CLI - operator tooling for the OAuth 2.0 core
// ABOUTME: Inspects the error registry and generates, hashes, and verifies client secrets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
//!
//! Usage:
//! ```bash
//! # Print the canonical error registry
//! warden-cli registry --format table
//!
//! # Generate a client secret
//! warden-cli generate-secret --bytes 48
//!
//! # Hash a secret read from stdin, bound to a user and client
//! printf '%s' "$SECRET" | warden-cli hash-secret --user user-1 --client wdn_abc
//!
//! # Verify a secret read from stdin against a stored hash
//! printf '%s' "$SECRET" | warden-cli verify-secret --user user-1 --client wdn_abc --hash '$argon2id$...'
//! ```

mod commands;
mod helpers;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use warden::logging::{LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "warden-cli",
    about = "Warden OAuth 2.0 core tooling",
    long_about = "Operator tooling for the Warden OAuth 2.0 core: error registry inspection and client secret handling."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical error registry
    Registry {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Generate a new client secret
    GenerateSecret {
        /// Random bytes before encoding (minimum 32)
        #[arg(long, default_value_t = warden::constants::secrets::MIN_SECRET_BYTES)]
        bytes: usize,
    },

    /// Hash a secret read from stdin
    HashSecret {
        /// Owning user bound into the hash
        #[arg(long)]
        user: String,

        /// Client id bound into the hash
        #[arg(long)]
        client: String,
    },

    /// Verify a secret read from stdin against a stored hash
    VerifySecret {
        /// Owning user bound into the hash
        #[arg(long)]
        user: String,

        /// Client id bound into the hash
        #[arg(long)]
        client: String,

        /// Stored Argon2id PHC string
        #[arg(long)]
        hash: String,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Aligned text table
    Table,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    logging.format = LogFormat::Compact;
    logging.level = if cli.verbose { "debug" } else { "warn" }.to_owned();
    logging.init()?;
    debug!("warden-cli starting");

    match cli.command {
        Command::Registry { format } => commands::registry::print(format)?,
        Command::GenerateSecret { bytes } => commands::secrets::generate(bytes)?,
        Command::HashSecret { user, client } => commands::secrets::hash(&user, &client).await?,
        Command::VerifySecret { user, client, hash } => {
            commands::secrets::verify(&user, &client, &hash).await?;
        }
    }

    Ok(())
}
