// ABOUTME: Foundation crate for the warden OAuth2 authorization core
// ABOUTME: Result envelope, canonical error registry, fault types, and persisted data models
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Warden Core
//!
//! Shared types with no async or crypto dependencies. Changes here are rare,
//! which keeps incremental rebuilds of the main crate cheap.
//!
//! ## Modules
//!
//! - **errors**: `AppError` faults, `StorageError`, and the generated error registry
//! - **outcome**: `Outcome` envelope (`SuccessResult` / `FailedResult`) and `RayId`
//! - **models**: clients, tokens, authorization codes, device codes, audit rows

/// Infrastructure faults and the canonical business error registry
pub mod errors;

/// Persisted and domain-facing data models
pub mod models;

/// Result envelope carried across every boundary-crossing operation
pub mod outcome;

pub use errors::{codes, AppError, AppResult, ErrorCode, FaultCode, StorageError};
pub use outcome::{FailedResult, Outcome, RayId, SuccessResult};
