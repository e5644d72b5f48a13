// ABOUTME: Tests loading OAuth and logging configuration from environment variables
// ABOUTME: Serialized with serial_test because the process environment is global
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use serial_test::serial;
use warden::config::{LimitScope, OAuth2Config};
use warden::constants::ttl;
use warden::logging::{LogFormat, LoggingConfig};
use warden::models::GrantType;
use warden::FaultCode;

const VARS: &[&str] = &[
    "WARDEN_ENABLED_GRANTS",
    "WARDEN_ACCESS_TOKEN_TTL_SECS",
    "WARDEN_REFRESH_TOKEN_TTL_SECS",
    "WARDEN_AUTH_CODE_TTL_SECS",
    "WARDEN_DEVICE_CODE_TTL_SECS",
    "WARDEN_REQUIRE_PKCE",
    "WARDEN_ROTATE_REFRESH_TOKENS",
    "WARDEN_MAX_ACCESS_TOKENS",
    "WARDEN_ACCESS_TOKEN_LIMIT_SCOPE",
    "WARDEN_REFRESH_TOKEN_LIMIT_SCOPE",
    "WARDEN_SECRET_BYTES",
    "WARDEN_DEVICE_VERIFICATION_URI",
    "LOG_FORMAT",
    "ENVIRONMENT",
    "SERVICE_NAME",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults_without_environment() {
    clear_env();
    let config = OAuth2Config::from_env().unwrap();
    assert_eq!(config, OAuth2Config::default());
}

#[test]
#[serial]
fn test_environment_overrides() {
    clear_env();
    std::env::set_var("WARDEN_ENABLED_GRANTS", "authorization_code, device_code");
    std::env::set_var("WARDEN_ACCESS_TOKEN_TTL_SECS", "120");
    std::env::set_var("WARDEN_REFRESH_TOKEN_TTL_SECS", "0");
    std::env::set_var("WARDEN_ROTATE_REFRESH_TOKENS", "false");
    std::env::set_var("WARDEN_MAX_ACCESS_TOKENS", "3");
    std::env::set_var("WARDEN_ACCESS_TOKEN_LIMIT_SCOPE", "refresh_token");

    let config = OAuth2Config::from_env().unwrap();
    assert_eq!(
        config.enabled_grants,
        vec![GrantType::AuthorizationCode, GrantType::DeviceCode]
    );
    assert_eq!(config.access_token_ttl_secs, 120);
    assert_eq!(config.refresh_token_ttl_secs, None);
    assert!(!config.rotate_refresh_tokens);
    assert_eq!(config.access_token_limit.max_active, Some(3));
    assert_eq!(config.access_token_limit.scope, LimitScope::PerRefreshToken);
    assert_eq!(config.refresh_token_limit.max_active, None);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_values_are_config_faults() {
    clear_env();

    std::env::set_var("WARDEN_REQUIRE_PKCE", "sometimes");
    assert_eq!(
        OAuth2Config::from_env().unwrap_err().code,
        FaultCode::ConfigInvalid
    );
    clear_env();

    std::env::set_var("WARDEN_ENABLED_GRANTS", "implicit");
    assert_eq!(
        OAuth2Config::from_env().unwrap_err().code,
        FaultCode::ConfigInvalid
    );
    clear_env();

    std::env::set_var("WARDEN_SECRET_BYTES", "8");
    assert_eq!(
        OAuth2Config::from_env().unwrap_err().code,
        FaultCode::ConfigInvalid
    );
    clear_env();

    std::env::set_var("WARDEN_REFRESH_TOKEN_LIMIT_SCOPE", "refresh_token");
    assert_eq!(
        OAuth2Config::from_env().unwrap_err().code,
        FaultCode::ConfigInvalid
    );
    clear_env();

    std::env::set_var("WARDEN_DEVICE_VERIFICATION_URI", "not a url");
    assert!(OAuth2Config::from_env().is_err());
    clear_env();
}

#[test]
#[serial]
fn test_lifetimes_past_the_upper_bound_are_rejected() {
    clear_env();

    for var in [
        "WARDEN_ACCESS_TOKEN_TTL_SECS",
        "WARDEN_REFRESH_TOKEN_TTL_SECS",
        "WARDEN_AUTH_CODE_TTL_SECS",
        "WARDEN_DEVICE_CODE_TTL_SECS",
    ] {
        std::env::set_var(var, i64::MAX.to_string());
        let err = OAuth2Config::from_env().unwrap_err();
        assert_eq!(err.code, FaultCode::ConfigInvalid, "{var}");
        clear_env();
    }

    std::env::set_var("WARDEN_ACCESS_TOKEN_TTL_SECS", ttl::MAX_SECS.to_string());
    let config = OAuth2Config::from_env().unwrap();
    assert_eq!(config.access_token_ttl_secs, ttl::MAX_SECS);
    clear_env();
}

#[test]
#[serial]
fn test_logging_config_from_environment() {
    clear_env();
    std::env::set_var("LOG_FORMAT", "json");
    std::env::set_var("ENVIRONMENT", "production");

    let config = LoggingConfig::from_env();
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.include_location);
    assert!(config.include_thread);
    assert_eq!(config.service_name, "warden");

    clear_env();
    assert_eq!(LoggingConfig::from_env().format, LogFormat::Pretty);
}
