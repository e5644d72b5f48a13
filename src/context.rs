// ABOUTME: Request-scoped execution context passed through every flow phase and condition
// ABOUTME: Type-keyed and append-only; the kernel forwards it without reading any entry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};

use warden_core::errors::{AppError, AppResult};

/// Mutable, request-scoped state shared by the phases of one flow execution
///
/// Each entry is keyed by its Rust type. A condition that resolves something
/// (the authenticated client, the redeemed code) provides it; later conditions
/// read it with [`ExecutionContext::require`]. Entries cannot be overwritten,
/// so a later condition can never silently replace state an earlier one
/// established. The final consumer may [`ExecutionContext::take`] an entry.
#[derive(Default)]
pub struct ExecutionContext {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    /// Empty context for a new flow invocation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry
    ///
    /// # Errors
    ///
    /// Returns an internal fault if an entry of type `T` already exists
    pub fn provide<T: Any + Send + Sync>(&mut self, value: T) -> AppResult<()> {
        let key = TypeId::of::<T>();
        if self.entries.contains_key(&key) {
            return Err(AppError::internal(format!(
                "execution context already holds {}",
                type_name::<T>()
            )));
        }
        self.entries.insert(key, Box::new(value));
        Ok(())
    }

    /// Borrow an entry if present
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Borrow an entry an earlier phase must have provided
    ///
    /// # Errors
    ///
    /// Returns an internal fault if the entry is missing; that is a wiring bug
    /// in the flow, not a business failure
    pub fn require<T: Any + Send + Sync>(&self) -> AppResult<&T> {
        self.get::<T>().ok_or_else(|| {
            AppError::internal(format!("execution context has no {}", type_name::<T>()))
        })
    }

    /// Remove and return an entry
    pub fn take<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// `true` if an entry of type `T` exists
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing has been provided yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for ExecutionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use warden_core::errors::FaultCode;

    #[derive(Debug, PartialEq)]
    struct ResolvedClient(&'static str);

    #[test]
    fn entries_are_keyed_by_type() {
        let mut ctx = ExecutionContext::new();
        ctx.provide(ResolvedClient("app")).unwrap();
        ctx.provide(42_u32).unwrap();

        assert_eq!(ctx.get::<ResolvedClient>(), Some(&ResolvedClient("app")));
        assert_eq!(ctx.require::<u32>().unwrap(), &42);
        assert!(ctx.get::<String>().is_none());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn entries_cannot_be_overwritten() {
        let mut ctx = ExecutionContext::new();
        ctx.provide(ResolvedClient("first")).unwrap();
        let err = ctx.provide(ResolvedClient("second")).unwrap_err();
        assert_eq!(err.code, FaultCode::InternalError);
        assert_eq!(ctx.require::<ResolvedClient>().unwrap().0, "first");
    }

    #[test]
    fn missing_required_entry_is_a_fault() {
        let ctx = ExecutionContext::new();
        assert_eq!(
            ctx.require::<ResolvedClient>().unwrap_err().code,
            FaultCode::InternalError
        );
    }

    #[test]
    fn take_removes_the_entry() {
        let mut ctx = ExecutionContext::new();
        ctx.provide(ResolvedClient("app")).unwrap();
        assert_eq!(ctx.take::<ResolvedClient>(), Some(ResolvedClient("app")));
        assert!(!ctx.contains::<ResolvedClient>());
        assert!(ctx.is_empty());
    }
}
