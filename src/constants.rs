// ABOUTME: Default policy values and fixed protocol limits used across flows and services
// ABOUTME: Grouped by concern so configuration defaults and validation share one source
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Token and code lifetimes (seconds)
pub mod ttl {
    /// Access token lifetime
    pub const ACCESS_TOKEN_SECS: i64 = 3600;
    /// Refresh token lifetime; `0` in configuration means no expiry
    pub const REFRESH_TOKEN_SECS: i64 = 30 * 24 * 3600;
    /// Authorization code lifetime (RFC 6749 recommends at most 10 minutes)
    pub const AUTHORIZATION_CODE_SECS: i64 = 600;
    /// Device code lifetime
    pub const DEVICE_CODE_SECS: i64 = 900;
    /// Minimum device polling interval
    pub const DEVICE_POLL_INTERVAL_SECS: i64 = 5;
    /// Extra seconds added to the interval on `slow_down` (RFC 8628 §3.5)
    pub const DEVICE_SLOW_DOWN_INCREMENT_SECS: i64 = 5;
    /// Upper bound on any configured lifetime or interval (ten years)
    pub const MAX_SECS: i64 = 10 * 365 * 24 * 3600;
}

/// Secret and token sizes
pub mod secrets {
    /// Minimum bytes of entropy for generated client secrets
    pub const MIN_SECRET_BYTES: usize = 32;
    /// Bytes of entropy for access tokens, refresh tokens, and codes
    pub const TOKEN_BYTES: usize = 32;
    /// Bytes of entropy for generated client ids
    pub const CLIENT_ID_BYTES: usize = 16;
    /// Prefix for generated client ids
    pub const CLIENT_ID_PREFIX: &str = "wdn_";
}

/// PKCE (RFC 7636 §4.1)
pub mod pkce {
    /// Minimum verifier / challenge length
    pub const MIN_LENGTH: usize = 43;
    /// Maximum verifier / challenge length
    pub const MAX_LENGTH: usize = 128;
}

/// Device authorization user codes (RFC 8628 §6.1)
pub mod user_code {
    /// Characters without vowels or look-alike glyphs
    pub const ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";
    /// Characters per half of `XXXX-XXXX`
    pub const GROUP_LEN: usize = 4;
}

/// Argon2id cost parameters (OWASP minimums)
pub mod argon2 {
    /// Memory cost in KiB
    pub const MEMORY_KIB: u32 = 19_456;
    /// Iterations
    pub const ITERATIONS: u32 = 2;
    /// Lanes
    pub const PARALLELISM: u32 = 1;
}

/// Audit event names
pub mod events {
    /// Client registered
    pub const CLIENT_REGISTERED: &str = "client.registered";
    /// Client secret rotated
    pub const CLIENT_SECRET_ROTATED: &str = "client.secret_rotated";
    /// Authorization code issued
    pub const CODE_ISSUED: &str = "authorization_code.issued";
    /// Tokens issued for a grant
    pub const TOKEN_ISSUED: &str = "token.issued";
    /// Refresh token exchanged
    pub const TOKEN_REFRESHED: &str = "token.refreshed";
    /// Device authorization started
    pub const DEVICE_AUTHORIZATION_STARTED: &str = "device.authorization_started";
    /// Device authorization approved or denied
    pub const DEVICE_DECISION: &str = "device.decision";
}

/// Service identity for logs
pub mod service_names {
    /// Default service name
    pub const WARDEN: &str = "warden";
}
