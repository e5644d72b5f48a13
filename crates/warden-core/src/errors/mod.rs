// ABOUTME: Infrastructure fault types and the canonical business error registry
// ABOUTME: Faults propagate as AppError; business failures travel as registry ErrorCodes inside Outcome
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Error Handling
//!
//! Two channels, never mixed:
//!
//! - **Business failures** are values: [`crate::outcome::FailedResult`] carrying a
//!   registry [`ErrorCode`].
//! - **Infrastructure faults** (storage unreachable, crypto backend failure,
//!   programming invariant violations) are [`AppError`] and travel through `?`.

/// Canonical error registry and generated per-namespace constants
pub mod registry;

pub use registry::{codes, ErrorCode, RegistryEntry};

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of infrastructure faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultCode {
    // Storage
    /// Backend unreachable or a commit did not complete
    StorageUnavailable,
    /// Optimistic concurrency check failed
    StorageConflict,
    /// Unique natural key already taken
    DuplicateRecord,
    /// Row addressed by id does not exist
    RecordNotFound,
    /// Attempted mutation of an append-only log
    AppendOnlyViolation,

    // Crypto
    /// Hashing or verification primitive failed
    CryptoFailure,
    /// Entropy source could not produce random bytes
    EntropyFailure,

    // Configuration
    /// Required configuration is missing
    ConfigMissing,
    /// Configuration value failed validation
    ConfigInvalid,

    // Caller / programming errors
    /// Caller supplied structurally invalid input (e.g. empty `ray_id`)
    InvalidInput,
    /// Internal invariant violated
    InternalError,
}

impl FaultCode {
    /// Human-oriented description of the fault class
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::StorageUnavailable => "Storage backend unavailable",
            Self::StorageConflict => "Concurrent storage modification detected",
            Self::DuplicateRecord => "A record with this key already exists",
            Self::RecordNotFound => "Record not found",
            Self::AppendOnlyViolation => "Append-only log cannot be modified",
            Self::CryptoFailure => "Cryptographic operation failed",
            Self::EntropyFailure => "Secure random source failed",
            Self::ConfigMissing => "Required configuration is missing",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::InvalidInput => "The provided input is invalid",
            Self::InternalError => "An internal error occurred",
        }
    }
}

/// Unified infrastructure fault
#[derive(Debug, Error)]
pub struct AppError {
    /// Fault classification
    pub code: FaultCode,
    /// Human-readable detail, never containing secrets
    pub message: String,
    /// Underlying cause for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a fault with the given code and message
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Invalid caller input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(FaultCode::InvalidInput, message)
    }

    /// Internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultCode::InternalError, message)
    }

    /// Invalid configuration value
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(FaultCode::ConfigInvalid, message)
    }

    /// Missing configuration value
    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(FaultCode::ConfigMissing, message)
    }

    /// Crypto primitive failure
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(FaultCode::CryptoFailure, message)
    }

    /// Entropy source failure
    pub fn entropy(message: impl Into<String>) -> Self {
        Self::new(FaultCode::EntropyFailure, message)
    }

    /// Storage backend failure
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::new(FaultCode::StorageUnavailable, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result alias for operations that can only fail with an infrastructure fault
pub type AppResult<T> = Result<T, AppError>;

/// Errors reported by storage backends through the generic table contracts
#[derive(Debug, Error)]
pub enum StorageError {
    /// No row with the addressed primary key
    #[error("{kind} record {id} not found")]
    NotFound {
        /// Entity kind
        kind: &'static str,
        /// Primary key that was addressed
        id: String,
    },

    /// Natural key or primary key already present
    #[error("{kind} record already exists")]
    Duplicate {
        /// Entity kind
        kind: &'static str,
    },

    /// A concurrent writer changed the row first
    #[error("conflicting concurrent write on {kind}")]
    Conflict {
        /// Entity kind
        kind: &'static str,
    },

    /// Update or delete attempted on the audit log
    #[error("audit log is append-only")]
    AppendOnly,

    /// Backend cannot be reached or the commit did not complete
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Fault classification for this storage error
    #[must_use]
    pub const fn fault_code(&self) -> FaultCode {
        match self {
            Self::NotFound { .. } => FaultCode::RecordNotFound,
            Self::Duplicate { .. } => FaultCode::DuplicateRecord,
            Self::Conflict { .. } => FaultCode::StorageConflict,
            Self::AppendOnly => FaultCode::AppendOnlyViolation,
            Self::Unavailable(_) => FaultCode::StorageUnavailable,
        }
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        Self::new(error.fault_code(), error.to_string()).with_source(error)
    }
}
