// ABOUTME: Template-method kernel running a grant flow as start, pre, run, post, success
// ABOUTME: Holds only injected collaborators and never interprets configuration or grant data
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{error, info, warn};
use warden_core::errors::{AppError, AppResult, ErrorCode};
use warden_core::outcome::{Outcome, RayId};

use crate::audit::AuditTrail;
use crate::clock::{Clock, SystemClock};
use crate::conditions::{Condition, ConditionChain};
use crate::config::OAuth2Config;
use crate::context::ExecutionContext;
use crate::credentials::{
    Argon2CredentialHasher, CredentialHasher, SecretGenerator, SystemSecretGenerator,
};
use crate::storage::StorageBackend;

/// Phase of a flow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    /// Pre-condition chain
    Preconditions,
    /// Flow-specific core logic
    Run,
    /// Post-condition chain
    Postconditions,
}

impl FlowPhase {
    /// Stable name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Preconditions => "preconditions",
            Self::Run => "run",
            Self::Postconditions => "postconditions",
        }
    }
}

impl Display for FlowPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of flow lifecycle events
pub trait FlowEvents: Send + Sync {
    /// Execution began
    fn flow_started(&self, flow: &'static str, ray_id: &RayId);

    /// A phase returned a business failure
    fn flow_failed(&self, flow: &'static str, phase: FlowPhase, ray_id: &RayId, code: ErrorCode);

    /// A phase raised an infrastructure fault
    fn flow_faulted(&self, flow: &'static str, phase: FlowPhase, ray_id: &RayId, fault: &AppError);

    /// Every phase succeeded
    fn flow_completed(&self, flow: &'static str, ray_id: &RayId, elapsed: Duration);
}

/// Writes lifecycle events as tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFlowEvents;

impl FlowEvents for TracingFlowEvents {
    fn flow_started(&self, flow: &'static str, ray_id: &RayId) {
        info!(ray_id = %ray_id, flow, "flow started");
    }

    fn flow_failed(&self, flow: &'static str, phase: FlowPhase, ray_id: &RayId, code: ErrorCode) {
        warn!(ray_id = %ray_id, flow, phase = %phase, error_code = %code, "flow failed");
    }

    fn flow_faulted(&self, flow: &'static str, phase: FlowPhase, ray_id: &RayId, fault: &AppError) {
        error!(ray_id = %ray_id, flow, phase = %phase, error = %fault, "flow faulted");
    }

    fn flow_completed(&self, flow: &'static str, ray_id: &RayId, elapsed: Duration) {
        info!(
            ray_id = %ray_id,
            flow,
            elapsed_ms = elapsed.num_milliseconds(),
            "flow completed"
        );
    }
}

/// Collaborators shared by the kernel and the flows built on it
#[derive(Clone)]
pub struct FlowDependencies {
    /// Backing store
    pub storage: Arc<dyn StorageBackend>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Read-only policy
    pub config: Arc<OAuth2Config>,
    /// Lifecycle observer
    pub events: Arc<dyn FlowEvents>,
    /// Client secret verification
    pub hasher: Arc<dyn CredentialHasher>,
    /// Client secret generation for registration and rotation
    pub generator: Arc<dyn SecretGenerator>,
}

impl FlowDependencies {
    /// Dependencies with the system clock, tracing events, an Argon2id
    /// hasher, and a secret generator sized by `config.secret_bytes`
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if `config` fails validation
    pub fn new(storage: Arc<dyn StorageBackend>, config: OAuth2Config) -> AppResult<Self> {
        config.validate()?;
        let hasher = Argon2CredentialHasher::new(config.argon2)?;
        let generator = SystemSecretGenerator::new(config.secret_bytes)?;
        Ok(Self {
            storage,
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
            events: Arc::new(TracingFlowEvents),
            hasher: Arc::new(hasher),
            generator: Arc::new(generator),
        })
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the lifecycle observer
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn FlowEvents>) -> Self {
        self.events = events;
        self
    }

    /// Replace the credential hasher
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace the secret generator
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn SecretGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Audit trail over the same storage and clock
    #[must_use]
    pub fn audit_trail(&self) -> AuditTrail {
        AuditTrail::new(Arc::clone(&self.storage), Arc::clone(&self.clock))
    }
}

/// A concrete grant flow: its own pre-conditions, core logic, and post-conditions
#[async_trait]
pub trait GrantFlow: Send + Sync {
    /// Typed parameters placed in the context before pre-conditions run
    type Params: Send + Sync + 'static;

    /// Stable flow name for events
    fn name(&self) -> &'static str;

    /// Gates run before [`GrantFlow::run`]
    fn preconditions(&self) -> &ConditionChain;

    /// Core logic; the success payload becomes the flow's result
    ///
    /// # Errors
    ///
    /// Infrastructure faults only
    async fn run(&self, ctx: &mut ExecutionContext, ray_id: &RayId) -> AppResult<Outcome>;

    /// Gates run after [`GrantFlow::run`], typically persistence and audit
    fn postconditions(&self) -> &ConditionChain;
}

/// Fixed lifecycle shared by every grant flow
///
/// start → preconditions → run → postconditions → success. A failure from any
/// phase is returned immediately and unmodified; faults propagate as
/// [`AppError`] and are never turned into failures here.
pub struct OAuth2Authorization<F> {
    flow: F,
    deps: FlowDependencies,
}

impl<F: GrantFlow> OAuth2Authorization<F> {
    /// Kernel running `flow`
    #[must_use]
    pub fn new(flow: F, deps: FlowDependencies) -> Self {
        Self { flow, deps }
    }

    /// The wrapped flow
    #[must_use]
    pub const fn flow(&self) -> &F {
        &self.flow
    }

    /// Injected collaborators
    #[must_use]
    pub const fn dependencies(&self) -> &FlowDependencies {
        &self.deps
    }

    /// Execute the flow
    ///
    /// `ray_id` is validated before any phase runs; `params` are provided to
    /// `ctx` for the flow's conditions.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a missing `ray_id`, otherwise whatever fault a phase
    /// raised
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        ray_id: &str,
        params: F::Params,
    ) -> AppResult<Outcome> {
        let ray_id = RayId::new(ray_id)?;
        let name = self.flow.name();
        let started_at = self.deps.clock.now();

        self.deps.events.flow_started(name, &ray_id);
        ctx.provide(params)?;

        let pre = self.flow.preconditions().validate(ctx, &ray_id).await;
        let pre = self.observe(FlowPhase::Preconditions, pre, &ray_id)?;
        if pre.is_failure() {
            return Ok(pre);
        }

        let run = self.flow.run(ctx, &ray_id).await;
        let payload = match self.observe(FlowPhase::Run, run, &ray_id)? {
            Outcome::Success(success) => success,
            failed @ Outcome::Failed(_) => return Ok(failed),
        };

        let post = self.flow.postconditions().validate(ctx, &ray_id).await;
        let post = self.observe(FlowPhase::Postconditions, post, &ray_id)?;
        if post.is_failure() {
            return Ok(post);
        }

        let elapsed = self.deps.clock.now() - started_at;
        self.deps.events.flow_completed(name, &ray_id, elapsed);
        Ok(Outcome::Success(payload))
    }

    /// Emit failure and fault events for a phase result, passing it through
    fn observe(
        &self,
        phase: FlowPhase,
        result: AppResult<Outcome>,
        ray_id: &RayId,
    ) -> AppResult<Outcome> {
        let name = self.flow.name();
        match &result {
            Ok(outcome) => {
                if let Some(code) = outcome.error_code() {
                    self.deps.events.flow_failed(name, phase, ray_id, code);
                }
            }
            Err(fault) => self.deps.events.flow_faulted(name, phase, ray_id, fault),
        }
        result
    }
}
