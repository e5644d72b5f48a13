// ABOUTME: Canonical, namespaced business failure codes generated from errors/registry.yaml
// ABOUTME: ErrorCode can only be obtained from generated constants, so unregistered codes do not compile
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt::{self, Display, Formatter};

use serde::{Serialize, Serializer};

/// Generated registry constants, one module per namespace
///
/// ```
/// use warden_core::errors::codes;
///
/// assert_eq!(codes::oauth::INVALID_GRANT.as_str(), "oauth.invalid_grant");
/// assert_eq!(codes::oauth_device::SLOW_DOWN.namespace(), "oauth.device");
/// ```
pub mod codes {
    include!(concat!(env!("OUT_DIR"), "/error_registry.rs"));
}

/// A canonical error code drawn from the registry
///
/// The constructor is private to this crate; the only way to hold an
/// `ErrorCode` is through a generated constant in [`codes`] or a successful
/// [`ErrorCode::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(&'static str);

impl ErrorCode {
    pub(crate) const fn registered(code: &'static str) -> Self {
        Self(code)
    }

    /// The stable wire string, e.g. `oauth.invalid_grant`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    /// Namespace portion of the code (`oauth`, `oauth.device`, `registration`)
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        self.0.rsplit_once('.').map_or(self.0, |(namespace, _)| namespace)
    }

    /// Registry metadata for this code
    #[must_use]
    pub fn entry(&self) -> Option<&'static RegistryEntry> {
        codes::ENTRIES.iter().find(|entry| entry.code == *self)
    }

    /// Resolve a wire string back into a registered code
    #[must_use]
    pub fn lookup(code: &str) -> Option<Self> {
        codes::ENTRIES
            .iter()
            .find(|entry| entry.code.as_str() == code)
            .map(|entry| entry.code)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// One registry row. `reference` and `description` are documentation only and
/// must never drive control flow.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryEntry {
    /// The canonical code
    pub code: ErrorCode,
    /// Namespace the code was declared under
    pub namespace: &'static str,
    /// RFC section or category the code originates from
    pub reference: &'static str,
    /// Human-oriented description for tooling
    pub description: &'static str,
}

/// All registered entries in declaration order
#[must_use]
pub fn entries() -> &'static [RegistryEntry] {
    codes::ENTRIES
}

/// Entries declared under exactly `namespace` (not its children)
pub fn namespace_entries(namespace: &str) -> impl Iterator<Item = &'static RegistryEntry> + '_ {
    codes::ENTRIES
        .iter()
        .filter(move |entry| entry.namespace == namespace)
}

/// Registry version this crate was built against
#[must_use]
pub const fn version() -> &'static str {
    codes::REGISTRY_VERSION
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn constants_resolve_to_registered_entries() {
        let entry = codes::oauth::INVALID_GRANT.entry().unwrap();
        assert_eq!(entry.namespace, "oauth");
        assert_eq!(entry.reference, "RFC 6749 §5.2");
    }

    #[test]
    fn lookup_rejects_unknown_codes() {
        assert_eq!(
            ErrorCode::lookup("oauth.invalid_scope"),
            Some(codes::oauth::INVALID_SCOPE)
        );
        assert!(ErrorCode::lookup("oauth.made_up").is_none());
    }

    #[test]
    fn nested_namespaces_are_kept_apart() {
        assert_eq!(codes::oauth_device::EXPIRED_TOKEN.namespace(), "oauth.device");
        assert!(namespace_entries("oauth").all(|e| !e.code.as_str().starts_with("oauth.device.")));
        assert_eq!(namespace_entries("oauth.device").count(), 4);
    }

    #[test]
    fn registration_namespace_has_no_policy_codes() {
        for entry in namespace_entries("registration") {
            let code = entry.code.as_str();
            assert!(!code.contains("unauthorized"), "{code}");
            assert!(!code.contains("permission"), "{code}");
        }
    }

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for entry in entries() {
            assert!(seen.insert(entry.code.as_str()));
        }
        assert!(!version().is_empty());
    }
}
