// ABOUTME: Wrapper condition that logs start, outcome, and faults of the condition it wraps
// ABOUTME: Keeps observation outside the chain executor so chains stay inert
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use async_trait::async_trait;
use tracing::{debug, error, info};
use warden_core::errors::AppResult;
use warden_core::outcome::{Outcome, RayId};

use super::Condition;
use crate::context::ExecutionContext;

/// Logs around an inner condition without changing its result
pub struct Traced<C> {
    inner: C,
}

impl<C: Condition> Traced<C> {
    /// Wrap `inner`
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }

    /// The wrapped condition
    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Condition> Condition for Traced<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        let condition = self.inner.name();
        debug!(ray_id = %ray_id, condition, "condition started");

        match self.inner.validate(ctx, ray_id).await {
            Ok(outcome) => {
                match outcome.error_code() {
                    None => debug!(ray_id = %ray_id, condition, "condition passed"),
                    Some(code) => info!(
                        ray_id = %ray_id,
                        condition,
                        error_code = %code,
                        "condition failed"
                    ),
                }
                Ok(outcome)
            }
            Err(fault) => {
                error!(ray_id = %ray_id, condition, error = %fault, "condition faulted");
                Err(fault)
            }
        }
    }
}
