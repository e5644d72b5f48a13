// ABOUTME: Cargo build script that generates error code constants from the registry
// ABOUTME: Validates namespace rules in errors/registry.yaml and emits one module per namespace
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

// Build scripts report failures by panicking
#![allow(clippy::panic)]

//! # Error Registry Code Generation
//!
//! `errors/registry.yaml` is the single source of truth for canonical failure
//! codes. This script validates it and writes `$OUT_DIR/error_registry.rs`,
//! which `src/errors/registry.rs` includes. The generated file holds:
//!
//! - `REGISTRY_VERSION`, copied from the YAML `version` field
//! - `ENTRIES`, every entry with its non-binding metadata
//! - one module per namespace (`oauth`, `oauth_device`, `registration`) with an
//!   `ErrorCode` constant per entry
//!
//! A malformed registry fails the build rather than producing a partial table.

use std::collections::HashSet;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::Deserialize;

const REGISTRY_PATH: &str = "errors/registry.yaml";

/// Words that mark an authorization or policy failure, which the
/// `registration` namespace must never carry.
const POLICY_MARKERS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "permission",
    "quota",
    "policy",
    "access_denied",
];

#[derive(Debug, Deserialize)]
struct Registry {
    version: String,
    namespaces: Vec<Namespace>,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    name: String,
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    code: String,
    reference: String,
    description: String,
}

fn main() {
    println!("cargo:rerun-if-changed={REGISTRY_PATH}");

    let raw = fs::read_to_string(REGISTRY_PATH)
        .unwrap_or_else(|e| panic!("cannot read {REGISTRY_PATH}: {e}"));
    let registry: Registry = serde_yaml::from_str(&raw)
        .unwrap_or_else(|e| panic!("cannot parse {REGISTRY_PATH}: {e}"));

    validate(&registry);

    let out_dir = env::var("OUT_DIR").unwrap_or_else(|e| panic!("OUT_DIR not set: {e}"));
    let dest = Path::new(&out_dir).join("error_registry.rs");
    fs::write(&dest, render(&registry))
        .unwrap_or_else(|e| panic!("cannot write {}: {e}", dest.display()));
}

fn validate(registry: &Registry) {
    let mut seen_codes = HashSet::new();
    let mut seen_namespaces = HashSet::new();

    for namespace in &registry.namespaces {
        assert!(
            seen_namespaces.insert(namespace.name.as_str()),
            "namespace `{}` declared twice",
            namespace.name
        );

        for entry in &namespace.entries {
            let prefix = format!("{}.", namespace.name);
            let suffix = entry.code.strip_prefix(&prefix).unwrap_or_else(|| {
                panic!(
                    "code `{}` does not belong to namespace `{}`",
                    entry.code, namespace.name
                )
            });
            assert!(
                !suffix.is_empty()
                    && suffix
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "code `{}` must end in a lower_snake_case name directly under `{}`",
                entry.code,
                namespace.name
            );
            assert!(
                seen_codes.insert(entry.code.as_str()),
                "code `{}` declared twice",
                entry.code
            );
            assert!(
                !entry.description.trim().is_empty(),
                "code `{}` has no description",
                entry.code
            );

            if namespace.name == "registration" {
                if let Some(marker) = POLICY_MARKERS.iter().find(|m| suffix.contains(*m)) {
                    panic!(
                        "code `{}` looks like a policy failure (`{marker}`); registration.* is reserved for materialization failures",
                        entry.code
                    );
                }
            }
        }
    }
}

fn module_name(namespace: &str) -> String {
    namespace.replace('.', "_")
}

fn const_name(namespace: &str, code: &str) -> String {
    code[namespace.len() + 1..].to_ascii_uppercase()
}

fn render(registry: &Registry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// @generated by build.rs from {REGISTRY_PATH}. Do not edit.");
    let _ = writeln!(out);
    let _ = writeln!(out, "/// Version of the registry this build was generated from");
    let _ = writeln!(out, "pub const REGISTRY_VERSION: &str = {:?};", registry.version);
    let _ = writeln!(out);
    let _ = writeln!(out, "/// Every registered code with its documentation metadata");
    let _ = writeln!(
        out,
        "pub static ENTRIES: &[crate::errors::registry::RegistryEntry] = &["
    );
    for namespace in &registry.namespaces {
        for entry in &namespace.entries {
            let _ = writeln!(
                out,
                "    crate::errors::registry::RegistryEntry {{ code: crate::errors::registry::ErrorCode::registered({:?}), namespace: {:?}, reference: {:?}, description: {:?} }},",
                entry.code, namespace.name, entry.reference, entry.description
            );
        }
    }
    let _ = writeln!(out, "];");

    for namespace in &registry.namespaces {
        let _ = writeln!(out);
        let _ = writeln!(out, "#[doc = {:?}]", format!("`{}.*` codes", namespace.name));
        let _ = writeln!(out, "pub mod {} {{", module_name(&namespace.name));
        for entry in &namespace.entries {
            let _ = writeln!(
                out,
                "    #[doc = {:?}]",
                format!("{} ({})", entry.description, entry.reference)
            );
            let _ = writeln!(
                out,
                "    pub const {}: crate::errors::registry::ErrorCode = crate::errors::registry::ErrorCode::registered({:?});",
                const_name(&namespace.name, &entry.code),
                entry.code
            );
        }
        let _ = writeln!(out, "}}");
    }

    out
}
