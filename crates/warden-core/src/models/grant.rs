// ABOUTME: Grant types, client types, PKCE methods, and scope sets shared by every flow
// ABOUTME: Wire strings follow RFC 6749, RFC 7636, and RFC 8628 naming
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// OAuth 2.0 grant types understood by the core
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    /// RFC 6749 §4.1
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    /// RFC 6749 §4.4
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    /// RFC 6749 §6
    #[serde(rename = "refresh_token")]
    RefreshToken,
    /// RFC 8628 §3.4
    #[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
    DeviceCode,
}

impl GrantType {
    /// Every grant type, in a stable order
    pub const ALL: [Self; 4] = [
        Self::AuthorizationCode,
        Self::ClientCredentials,
        Self::RefreshToken,
        Self::DeviceCode,
    ];

    /// Wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        }
    }
}

impl Display for GrantType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|grant| grant.as_str() == s || (s == "device_code" && *grant == Self::DeviceCode))
            .ok_or_else(|| AppError::invalid_input(format!("unknown grant type: {s}")))
    }
}

/// RFC 6749 §2.1 client types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Can hold a secret; authenticates with it
    #[default]
    Confidential,
    /// Cannot hold a secret (native/SPA/device clients)
    Public,
}

/// PKCE code challenge method. Only S256 is accepted; `plain` is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    /// SHA-256 transformation (RFC 7636 §4.2)
    S256,
}

impl PkceMethod {
    /// Wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }

    /// Parse a method name, defaulting to S256 when absent
    #[must_use]
    pub fn parse(method: Option<&str>) -> Option<Self> {
        match method.unwrap_or("S256") {
            "S256" => Some(Self::S256),
            _ => None,
        }
    }
}

/// Space-delimited scope set (RFC 6749 §3.3), order-insensitive
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Scope(BTreeSet<String>);

impl Scope {
    /// Parse a space-delimited scope string; `None` is the empty set
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        Self(
            raw.unwrap_or_default()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
        )
    }

    /// `true` if no scope tokens are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if every token in `self` is also in `other`
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Tokens in `self` that are missing from `other`
    #[must_use]
    pub fn excess_over(&self, other: &Self) -> Vec<String> {
        self.0.difference(&other.0).cloned().collect()
    }

    /// `None` for the empty set, otherwise the space-joined string
    #[must_use]
    pub fn to_option(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.to_string())
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        f.write_str(&joined)
    }
}

impl From<String> for Scope {
    fn from(raw: String) -> Self {
        Self::parse(Some(&raw))
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn grant_types_round_trip_wire_names() {
        for grant in GrantType::ALL {
            assert_eq!(grant.as_str().parse::<GrantType>().unwrap(), grant);
        }
        assert_eq!("device_code".parse::<GrantType>().unwrap(), GrantType::DeviceCode);
        assert!("password".parse::<GrantType>().is_err());
    }

    #[test]
    fn scope_subset_ignores_order_and_duplicates() {
        let granted = Scope::parse(Some("read write  admin"));
        let requested = Scope::parse(Some("write read read"));
        assert!(requested.is_subset_of(&granted));
        assert_eq!(requested.to_string(), "read write");

        let wider = Scope::parse(Some("read delete"));
        assert!(!wider.is_subset_of(&granted));
        assert_eq!(wider.excess_over(&granted), vec!["delete".to_owned()]);
    }

    #[test]
    fn empty_scope_is_subset_of_anything() {
        assert!(Scope::parse(None).is_subset_of(&Scope::parse(Some("read"))));
        assert_eq!(Scope::parse(Some("  ")).to_option(), None);
    }

    #[test]
    fn only_s256_is_accepted() {
        assert_eq!(PkceMethod::parse(None), Some(PkceMethod::S256));
        assert_eq!(PkceMethod::parse(Some("plain")), None);
    }
}
