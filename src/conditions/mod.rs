// ABOUTME: Single-purpose validation gates and the ordered, short-circuiting chain that runs them
// ABOUTME: Business failures come back as Outcome values; only infrastructure faults use Err
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Conditions
//!
//! A [`Condition`] inspects the [`ExecutionContext`] (and whatever storage or
//! configuration it was built with) and returns an [`Outcome`]. It may
//! provide resolved state to the context for later conditions, and must never
//! touch configuration.
//!
//! A [`ConditionChain`] runs conditions strictly in order and stops at the
//! first failure, returning it untouched. The chain is itself a condition, so
//! chains nest. It adds no logging or retries; wrap a condition in
//! [`Traced`] to observe it.

mod traced;

pub use traced::Traced;

use async_trait::async_trait;
use warden_core::errors::AppResult;
use warden_core::outcome::{Outcome, RayId};

use crate::context::ExecutionContext;

/// A validation gate run before or after a flow's core logic
#[async_trait]
pub trait Condition: Send + Sync {
    /// Short stable name for logs
    fn name(&self) -> &'static str;

    /// Check the condition
    ///
    /// Expected failures are `Ok(Outcome::Failed(..))` carrying `ray_id`.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults (storage, crypto, wiring bugs)
    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome>;
}

/// Ordered conditions executed with short-circuit on the first failure
#[derive(Default)]
pub struct ConditionChain {
    name: &'static str,
    conditions: Vec<Box<dyn Condition>>,
}

impl ConditionChain {
    /// Empty chain; vacuously successful
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            conditions: Vec::new(),
        }
    }

    /// Append a condition (builder style)
    #[must_use]
    pub fn with(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    /// Append a condition
    pub fn push(&mut self, condition: impl Condition + 'static) {
        self.conditions.push(Box::new(condition));
    }

    /// Number of conditions
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// `true` for a chain with no conditions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Condition names in execution order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.conditions.iter().map(|condition| condition.name())
    }
}

#[async_trait]
impl Condition for ConditionChain {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn validate(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome> {
        for condition in &self.conditions {
            let outcome = condition.validate(ctx, ray_id).await?;
            if outcome.is_failure() {
                return Ok(outcome);
            }
        }
        Ok(Outcome::empty_success(ray_id))
    }
}
