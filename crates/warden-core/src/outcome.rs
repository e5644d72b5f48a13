// ABOUTME: Three-shape outcome envelope returned by every boundary-crossing operation
// ABOUTME: Success and failure are values carrying the caller's ray_id; faults stay in AppError
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::errors::{AppError, AppResult, ErrorCode};

/// Caller-supplied correlation identifier
///
/// Required on every flow invocation; an empty or whitespace-only value is
/// rejected before any phase runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RayId(String);

impl RayId {
    /// Validate and wrap a caller-supplied ray id
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the value is empty or only whitespace
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::invalid_input("ray_id is required"));
        }
        Ok(Self(value))
    }

    /// Fresh random ray id for callers that do not receive one upstream
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RayId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RayId> for String {
    fn from(ray_id: RayId) -> Self {
        ray_id.0
    }
}

impl Display for RayId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Successful outcome (`status = true`)
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessResult {
    client_message: Value,
    ray_id: RayId,
}

impl SuccessResult {
    /// Build a success carrying `client_message`
    #[must_use]
    pub const fn new(client_message: Value, ray_id: RayId) -> Self {
        Self {
            client_message,
            ray_id,
        }
    }

    /// Always `true`
    #[must_use]
    pub const fn status(&self) -> bool {
        true
    }

    /// Opaque payload for the caller
    #[must_use]
    pub const fn client_message(&self) -> &Value {
        &self.client_message
    }

    /// Correlation id supplied by the caller
    #[must_use]
    pub const fn ray_id(&self) -> &RayId {
        &self.ray_id
    }
}

/// Failed outcome (`status = false`) with a registry error code
#[derive(Debug, Clone, PartialEq)]
pub struct FailedResult {
    client_message: Value,
    ray_id: RayId,
    error_code: ErrorCode,
}

impl FailedResult {
    /// Build a failure carrying `client_message`
    #[must_use]
    pub const fn new(error_code: ErrorCode, client_message: Value, ray_id: RayId) -> Self {
        Self {
            client_message,
            ray_id,
            error_code,
        }
    }

    /// Always `false`
    #[must_use]
    pub const fn status(&self) -> bool {
        false
    }

    /// Human-oriented message the embedder may localize or replace
    #[must_use]
    pub const fn client_message(&self) -> &Value {
        &self.client_message
    }

    /// Correlation id supplied by the caller
    #[must_use]
    pub const fn ray_id(&self) -> &RayId {
        &self.ray_id
    }

    /// Stable canonical code, safe to expose
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        self.error_code
    }
}

/// Outcome of a business operation
///
/// Callers branch on [`Outcome::status`], never on payload shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation succeeded
    Success(SuccessResult),
    /// The operation failed with an expected business failure
    Failed(FailedResult),
}

impl Outcome {
    /// Success with the given payload
    #[must_use]
    pub fn success(client_message: Value, ray_id: &RayId) -> Self {
        Self::Success(SuccessResult::new(client_message, ray_id.clone()))
    }

    /// Success with an empty object payload
    #[must_use]
    pub fn empty_success(ray_id: &RayId) -> Self {
        Self::success(Value::Object(serde_json::Map::new()), ray_id)
    }

    /// Failure with a plain-text client message
    #[must_use]
    pub fn failed(error_code: ErrorCode, message: impl Into<String>, ray_id: &RayId) -> Self {
        Self::Failed(FailedResult::new(
            error_code,
            Value::String(message.into()),
            ray_id.clone(),
        ))
    }

    /// Authoritative success flag
    #[must_use]
    pub const fn status(&self) -> bool {
        match self {
            Self::Success(success) => success.status(),
            Self::Failed(failed) => failed.status(),
        }
    }

    /// `true` for [`Outcome::Success`]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status()
    }

    /// `true` for [`Outcome::Failed`]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.status()
    }

    /// Correlation id carried by either variant
    #[must_use]
    pub const fn ray_id(&self) -> &RayId {
        match self {
            Self::Success(success) => success.ray_id(),
            Self::Failed(failed) => failed.ray_id(),
        }
    }

    /// Payload carried by either variant
    #[must_use]
    pub const fn client_message(&self) -> &Value {
        match self {
            Self::Success(success) => success.client_message(),
            Self::Failed(failed) => failed.client_message(),
        }
    }

    /// Error code for failures, `None` for successes
    #[must_use]
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Success(_) => None,
            Self::Failed(failed) => Some(failed.error_code()),
        }
    }

    /// Consume the outcome and return its payload
    #[must_use]
    pub fn into_client_message(self) -> Value {
        match self {
            Self::Success(success) => success.client_message,
            Self::Failed(failed) => failed.client_message,
        }
    }
}

impl From<SuccessResult> for Outcome {
    fn from(success: SuccessResult) -> Self {
        Self::Success(success)
    }
}

impl From<FailedResult> for Outcome {
    fn from(failed: FailedResult) -> Self {
        Self::Failed(failed)
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    status: bool,
    client_message: &'a Value,
    ray_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<ErrorCode>,
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            status: self.status(),
            client_message: self.client_message(),
            ray_id: self.ray_id().as_str(),
            error_code: self.error_code(),
        }
        .serialize(serializer)
    }
}
