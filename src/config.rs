// ABOUTME: Immutable OAuth 2.0 policy shared read-only by every flow and service
// ABOUTME: Loaded from WARDEN_* environment variables with defaults, validated before use
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration answers "what is allowed". It is built once, validated, and
//! shared as `Arc<OAuth2Config>`; flows read it and never mutate it.

use std::env;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use warden_core::errors::{AppError, AppResult};
use warden_core::models::GrantType;

use crate::constants::{argon2, secrets, ttl};

/// Which tokens count toward a FIFO limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// All active tokens of one client
    PerClient,
    /// Active tokens of one client for one user
    PerClientUser,
    /// Active access tokens issued under one refresh token (access tokens only)
    PerRefreshToken,
}

impl FromStr for LimitScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" | "per_client" => Ok(Self::PerClient),
            "client_user" | "per_client_user" => Ok(Self::PerClientUser),
            "refresh_token" | "per_refresh_token" => Ok(Self::PerRefreshToken),
            other => Err(AppError::config_invalid(format!(
                "unknown token limit scope: {other}"
            ))),
        }
    }
}

/// FIFO cap on simultaneously active tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimit {
    /// Maximum active tokens; `None` disables the limit, `Some(0)` disables issuance
    pub max_active: Option<usize>,
    /// Grouping the limit applies to
    pub scope: LimitScope,
}

impl TokenLimit {
    /// No limit
    #[must_use]
    pub const fn unlimited(scope: LimitScope) -> Self {
        Self {
            max_active: None,
            scope,
        }
    }

    /// At most `max_active` per `scope`
    #[must_use]
    pub const fn new(max_active: usize, scope: LimitScope) -> Self {
        Self {
            max_active: Some(max_active),
            scope,
        }
    }

    /// `true` when configured to zero, meaning nothing may be issued
    #[must_use]
    pub const fn blocks_issuance(&self) -> bool {
        matches!(self.max_active, Some(0))
    }
}

/// Argon2id cost parameters for client secret hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Settings {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iterations
    pub iterations: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for Argon2Settings {
    fn default() -> Self {
        Self {
            memory_kib: argon2::MEMORY_KIB,
            iterations: argon2::ITERATIONS,
            parallelism: argon2::PARALLELISM,
        }
    }
}

/// OAuth 2.0 authorization policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Config {
    /// Grants the server accepts at all
    pub enabled_grants: Vec<GrantType>,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in seconds; `None` never expires
    pub refresh_token_ttl_secs: Option<i64>,
    /// Authorization code lifetime in seconds
    pub authorization_code_ttl_secs: i64,
    /// Device code lifetime in seconds
    pub device_code_ttl_secs: i64,
    /// Minimum seconds between device polls
    pub device_poll_interval_secs: i64,
    /// Verification page shown to device users
    pub device_verification_uri: String,
    /// Require PKCE on every authorization request
    pub require_pkce: bool,
    /// Issue a new refresh token on every refresh and revoke the old one
    pub rotate_refresh_tokens: bool,
    /// FIFO limit on active access tokens
    pub access_token_limit: TokenLimit,
    /// FIFO limit on active refresh tokens
    pub refresh_token_limit: TokenLimit,
    /// Bytes of entropy in generated client secrets
    pub secret_bytes: usize,
    /// Secret hashing cost
    pub argon2: Argon2Settings,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            enabled_grants: GrantType::ALL.to_vec(),
            access_token_ttl_secs: ttl::ACCESS_TOKEN_SECS,
            refresh_token_ttl_secs: Some(ttl::REFRESH_TOKEN_SECS),
            authorization_code_ttl_secs: ttl::AUTHORIZATION_CODE_SECS,
            device_code_ttl_secs: ttl::DEVICE_CODE_SECS,
            device_poll_interval_secs: ttl::DEVICE_POLL_INTERVAL_SECS,
            device_verification_uri: "https://localhost/device".into(),
            require_pkce: true,
            rotate_refresh_tokens: true,
            access_token_limit: TokenLimit::unlimited(LimitScope::PerClientUser),
            refresh_token_limit: TokenLimit::unlimited(LimitScope::PerClientUser),
            secret_bytes: secrets::MIN_SECRET_BYTES,
            argon2: Argon2Settings::default(),
        }
    }
}

impl OAuth2Config {
    /// Load configuration from environment variables
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `WARDEN_ENABLED_GRANTS` | comma-separated grant types |
    /// | `WARDEN_ACCESS_TOKEN_TTL_SECS` | access token lifetime |
    /// | `WARDEN_REFRESH_TOKEN_TTL_SECS` | refresh token lifetime, `0` for none |
    /// | `WARDEN_AUTH_CODE_TTL_SECS` | authorization code lifetime |
    /// | `WARDEN_DEVICE_CODE_TTL_SECS` | device code lifetime |
    /// | `WARDEN_DEVICE_POLL_INTERVAL_SECS` | device polling interval |
    /// | `WARDEN_DEVICE_VERIFICATION_URI` | device verification page |
    /// | `WARDEN_REQUIRE_PKCE` | `true`/`false` |
    /// | `WARDEN_ROTATE_REFRESH_TOKENS` | `true`/`false` |
    /// | `WARDEN_MAX_ACCESS_TOKENS` | access token FIFO limit |
    /// | `WARDEN_ACCESS_TOKEN_LIMIT_SCOPE` | `client`, `client_user`, `refresh_token` |
    /// | `WARDEN_MAX_REFRESH_TOKENS` | refresh token FIFO limit |
    /// | `WARDEN_REFRESH_TOKEN_LIMIT_SCOPE` | `client`, `client_user` |
    /// | `WARDEN_SECRET_BYTES` | client secret entropy |
    /// | `WARDEN_ARGON2_MEMORY_KIB`, `WARDEN_ARGON2_ITERATIONS`, `WARDEN_ARGON2_PARALLELISM` | hashing cost |
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if a variable does not parse or the result
    /// fails [`OAuth2Config::validate`]
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let enabled_grants = match env::var("WARDEN_ENABLED_GRANTS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|grant| !grant.is_empty())
                .map(|grant| {
                    grant.parse::<GrantType>().map_err(|e| {
                        AppError::config_invalid(format!("WARDEN_ENABLED_GRANTS: {}", e.message))
                    })
                })
                .collect::<AppResult<Vec<_>>>()?,
            Err(_) => defaults.enabled_grants,
        };

        let refresh_token_ttl_secs = match env_parse::<i64>("WARDEN_REFRESH_TOKEN_TTL_SECS")? {
            Some(0) => None,
            Some(secs) => Some(secs),
            None => defaults.refresh_token_ttl_secs,
        };

        let config = Self {
            enabled_grants,
            access_token_ttl_secs: env_parse("WARDEN_ACCESS_TOKEN_TTL_SECS")?
                .unwrap_or(defaults.access_token_ttl_secs),
            refresh_token_ttl_secs,
            authorization_code_ttl_secs: env_parse("WARDEN_AUTH_CODE_TTL_SECS")?
                .unwrap_or(defaults.authorization_code_ttl_secs),
            device_code_ttl_secs: env_parse("WARDEN_DEVICE_CODE_TTL_SECS")?
                .unwrap_or(defaults.device_code_ttl_secs),
            device_poll_interval_secs: env_parse("WARDEN_DEVICE_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.device_poll_interval_secs),
            device_verification_uri: env::var("WARDEN_DEVICE_VERIFICATION_URI")
                .unwrap_or(defaults.device_verification_uri),
            require_pkce: env_parse("WARDEN_REQUIRE_PKCE")?.unwrap_or(defaults.require_pkce),
            rotate_refresh_tokens: env_parse("WARDEN_ROTATE_REFRESH_TOKENS")?
                .unwrap_or(defaults.rotate_refresh_tokens),
            access_token_limit: TokenLimit {
                max_active: env_parse("WARDEN_MAX_ACCESS_TOKENS")?,
                scope: env_parse("WARDEN_ACCESS_TOKEN_LIMIT_SCOPE")?
                    .unwrap_or(defaults.access_token_limit.scope),
            },
            refresh_token_limit: TokenLimit {
                max_active: env_parse("WARDEN_MAX_REFRESH_TOKENS")?,
                scope: env_parse("WARDEN_REFRESH_TOKEN_LIMIT_SCOPE")?
                    .unwrap_or(defaults.refresh_token_limit.scope),
            },
            secret_bytes: env_parse("WARDEN_SECRET_BYTES")?.unwrap_or(defaults.secret_bytes),
            argon2: Argon2Settings {
                memory_kib: env_parse("WARDEN_ARGON2_MEMORY_KIB")?
                    .unwrap_or(defaults.argon2.memory_kib),
                iterations: env_parse("WARDEN_ARGON2_ITERATIONS")?
                    .unwrap_or(defaults.argon2.iterations),
                parallelism: env_parse("WARDEN_ARGON2_PARALLELISM")?
                    .unwrap_or(defaults.argon2.parallelism),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` describing the first offending setting
    pub fn validate(&self) -> AppResult<()> {
        let positive = [
            ("access_token_ttl_secs", self.access_token_ttl_secs),
            ("authorization_code_ttl_secs", self.authorization_code_ttl_secs),
            ("device_code_ttl_secs", self.device_code_ttl_secs),
            ("device_poll_interval_secs", self.device_poll_interval_secs),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, value)| *value <= 0) {
            return Err(AppError::config_invalid(format!(
                "{name} must be positive, got {value}"
            )));
        }
        if let Some(secs) = self.refresh_token_ttl_secs.filter(|secs| *secs <= 0) {
            return Err(AppError::config_invalid(format!(
                "refresh_token_ttl_secs must be positive or unset, got {secs}"
            )));
        }
        let bounded = positive
            .into_iter()
            .chain(
                self.refresh_token_ttl_secs
                    .map(|secs| ("refresh_token_ttl_secs", secs)),
            )
            .find(|(_, value)| *value > ttl::MAX_SECS);
        if let Some((name, value)) = bounded {
            return Err(AppError::config_invalid(format!(
                "{name} must be at most {}, got {value}",
                ttl::MAX_SECS
            )));
        }
        if self.secret_bytes < secrets::MIN_SECRET_BYTES {
            return Err(AppError::config_invalid(format!(
                "secret_bytes must be at least {}, got {}",
                secrets::MIN_SECRET_BYTES,
                self.secret_bytes
            )));
        }
        if self.refresh_token_limit.scope == LimitScope::PerRefreshToken {
            return Err(AppError::config_invalid(
                "refresh_token_limit cannot be scoped per refresh token",
            ));
        }
        if self.argon2.iterations == 0 || self.argon2.parallelism == 0 {
            return Err(AppError::config_invalid(
                "argon2 iterations and parallelism must be at least 1",
            ));
        }
        if self.argon2.memory_kib < 8 * self.argon2.parallelism {
            return Err(AppError::config_invalid(
                "argon2 memory_kib must be at least 8 * parallelism",
            ));
        }
        url::Url::parse(&self.device_verification_uri).map_err(|e| {
            AppError::config_invalid(format!("device_verification_uri is not a URL: {e}"))
        })?;
        Ok(())
    }

    /// `true` if `grant` is enabled
    #[must_use]
    pub fn grant_enabled(&self, grant: GrantType) -> bool {
        self.enabled_grants.contains(&grant)
    }

    /// Expiry of an access token issued at `now`
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the lifetime does not fit the calendar
    pub fn access_token_expiry(&self, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        expiry_after(now, "access_token_ttl_secs", self.access_token_ttl_secs)
    }

    /// Expiry of a refresh token issued at `now`, `None` when refresh tokens
    /// never expire
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the lifetime does not fit the calendar
    pub fn refresh_token_expiry(&self, now: DateTime<Utc>) -> AppResult<Option<DateTime<Utc>>> {
        self.refresh_token_ttl_secs
            .map(|secs| expiry_after(now, "refresh_token_ttl_secs", secs))
            .transpose()
    }

    /// Expiry of an authorization code issued at `now`
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the lifetime does not fit the calendar
    pub fn authorization_code_expiry(&self, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        expiry_after(
            now,
            "authorization_code_ttl_secs",
            self.authorization_code_ttl_secs,
        )
    }

    /// Expiry of a device code issued at `now`
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the lifetime does not fit the calendar
    pub fn device_code_expiry(&self, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        expiry_after(now, "device_code_ttl_secs", self.device_code_ttl_secs)
    }
}

fn expiry_after(now: DateTime<Utc>, name: &str, secs: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_seconds(secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AppError::config_invalid(format!("{name}={secs} overflows the expiry time")))
}

fn env_parse<T>(key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::config_invalid(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}
