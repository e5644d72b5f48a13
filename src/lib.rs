// ABOUTME: Library entry point for the Warden OAuth 2.0 transactional core
// ABOUTME: Flow kernel, grant flows, credential services, storage contracts, and ambient setup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Warden
//!
//! The transactional core of an OAuth 2.0 authorization server. It executes
//! grant flows as ordered, guarded steps, manages client credentials, and
//! keeps token storage atomic under concurrent requests. Transport (HTTP
//! routing, request parsing, response formatting) belongs to the embedder.
//!
//! ## Architecture
//!
//! - **Outcome envelope**: every operation returns [`Outcome`]; callers branch
//!   on `status()`. Infrastructure faults travel separately as [`AppError`].
//! - **Error registry**: failure codes come from [`codes`], generated at build
//!   time from `crates/warden-core/errors/registry.yaml`.
//! - **Conditions**: small async gates composed into [`conditions::ConditionChain`]s.
//! - **Flow kernel**: [`flows::OAuth2Authorization`] runs a flow's
//!   pre-conditions, core logic, and post-conditions in a fixed order.
//! - **Storage**: grant-agnostic per-kind tables behind a transaction; flows
//!   compose rotation, redemption, and eviction from those primitives.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use warden::config::OAuth2Config;
//! use warden::context::ExecutionContext;
//! use warden::flows::{ClientCredentials, ClientCredentialsFlow, ClientCredentialsGrant};
//! use warden::flows::{FlowDependencies, OAuth2Authorization};
//! use warden::storage::InMemoryStorage;
//!
//! # async fn demo() -> warden::AppResult<()> {
//! let deps = FlowDependencies::new(Arc::new(InMemoryStorage::new()), OAuth2Config::from_env()?)?;
//! let kernel = OAuth2Authorization::new(ClientCredentialsFlow::new(&deps), deps);
//! let outcome = kernel
//!     .execute(
//!         &mut ExecutionContext::new(),
//!         "ray-1",
//!         ClientCredentialsGrant {
//!             client: ClientCredentials::confidential("wdn_client", "secret"),
//!             scope: Some("read".into()),
//!         },
//!     )
//!     .await?;
//! println!("{}", serde_json::to_string(&outcome).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

/// Best-effort audit trail
pub mod audit;

/// Time source abstraction
pub mod clock;

/// Condition trait, chains, and logging wrapper
pub mod conditions;

/// OAuth 2.0 policy configuration
pub mod config;

/// Application constants grouped by domain
pub mod constants;

/// Type-keyed execution context shared by a flow's phases
pub mod context;

/// Secret generation, hashing, and rotation
pub mod credentials;

/// Flow kernel and concrete grant flows
pub mod flows;

/// Structured logging setup
pub mod logging;

/// Client registration materialization
pub mod registration;

/// Storage contracts and the in-memory backend
pub mod storage;

pub use warden_core::errors::{codes, AppError, AppResult, ErrorCode, FaultCode, StorageError};
pub use warden_core::models;
pub use warden_core::outcome::{FailedResult, Outcome, RayId, SuccessResult};
