// ABOUTME: Output formatting helpers for warden-cli
// ABOUTME: Registry tables and once-only secret banners
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use warden::ErrorCode;
use warden_core::errors::registry::RegistryEntry;

/// Print registry entries as an aligned table
pub fn display_registry_table(version: &str, entries: &[RegistryEntry]) {
    let code_width = entries
        .iter()
        .map(|entry| entry.code.as_str().len())
        .max()
        .unwrap_or(4)
        .max(4);
    let reference_width = entries
        .iter()
        .map(|entry| entry.reference.chars().count())
        .max()
        .unwrap_or(9)
        .max(9);

    println!("Error registry v{version}");
    println!("{}", "=".repeat(code_width + reference_width + 20));
    println!("{:<code_width$}  {:<reference_width$}  DESCRIPTION", "CODE", "REFERENCE");
    for entry in entries {
        println!(
            "{:<code_width$}  {:<reference_width$}  {}",
            entry.code.as_str(),
            entry.reference,
            entry.description
        );
    }
    println!("\n{} codes", entries.len());
}

/// Print a freshly generated secret with handling notes
pub fn display_generated_secret(secret: &str, bytes: usize) {
    println!("\nClient secret generated ({bytes} random bytes)");
    println!("{}", "=".repeat(60));
    println!("{secret}");
    println!("{}", "=".repeat(60));
    println!("• This value is shown ONLY ONCE; store only its hash");
    println!("• Hash it with: warden-cli hash-secret --user <owner> --client <client_id>");
}

/// Print a verification verdict
pub fn display_verification(verified: bool, code_hint: Option<ErrorCode>) {
    if verified {
        println!("verified: secret matches the stored hash");
    } else if let Some(code) = code_hint {
        println!("rejected: secret does not match ({code})");
    } else {
        println!("rejected: secret does not match");
    }
}
