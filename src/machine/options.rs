//! Late-bound implementation tables for named actions, guards, services,
//! delays and activities
//!
//! Symbolic names in a machine definition are resolved against these tables
//! at step time, so a machine can be cloned with overridden implementations
//! without rebuilding its definition.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::action::ActionFn;
use super::event::Event;
use super::guard::{GuardArgs, GuardFn};
use super::Context;

/// Named implementation tables attached to a machine
#[derive(Clone, Default)]
pub struct MachineOptions {
    actions: HashMap<String, ActionFn>,
    guards: HashMap<String, GuardFn>,
    delays: HashMap<String, u64>,
    services: HashMap<String, Value>,
    activities: HashMap<String, ActionFn>,
}

impl MachineOptions {
    /// Create empty option tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom action implementation
    pub fn action<F>(mut self, name: impl Into<String>, exec: F) -> Self
    where
        F: Fn(&Context, &Event) + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(exec));
        self
    }

    /// Register an infallible guard implementation
    pub fn guard<F>(mut self, name: impl Into<String>, pred: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(
            name.into(),
            Arc::new(move |ctx, event, _args| Ok(pred(ctx, event))),
        );
        self
    }

    /// Register a fallible guard implementation with full arguments
    pub fn try_guard<F>(mut self, name: impl Into<String>, pred: F) -> Self
    where
        F: Fn(&Context, &Event, &GuardArgs<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Arc::new(pred));
        self
    }

    /// Register a named delay in milliseconds
    pub fn delay(mut self, name: impl Into<String>, millis: u64) -> Self {
        self.delays.insert(name.into(), millis);
        self
    }

    /// Register a service descriptor under its source name
    pub fn service(mut self, name: impl Into<String>, descriptor: Value) -> Self {
        self.services.insert(name.into(), descriptor);
        self
    }

    /// Register an activity implementation
    pub fn activity<F>(mut self, name: impl Into<String>, exec: F) -> Self
    where
        F: Fn(&Context, &Event) + Send + Sync + 'static,
    {
        self.activities.insert(name.into(), Arc::new(exec));
        self
    }

    /// Merge `overrides` over these options; override entries win
    pub fn merged_with(&self, overrides: &MachineOptions) -> MachineOptions {
        let mut merged = self.clone();
        merged
            .actions
            .extend(overrides.actions.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .guards
            .extend(overrides.guards.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.delays.extend(overrides.delays.iter().map(|(k, v)| (k.clone(), *v)));
        merged.services.extend(
            overrides
                .services
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged.activities.extend(
            overrides
                .activities
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged
    }

    /// Look up a custom action implementation
    pub fn action_impl(&self, name: &str) -> Option<&ActionFn> {
        self.actions.get(name)
    }

    /// Look up a guard implementation
    pub fn guard_impl(&self, name: &str) -> Option<&GuardFn> {
        self.guards.get(name)
    }

    /// Resolve a named delay to milliseconds
    pub fn delay_millis(&self, name: &str) -> Option<u64> {
        self.delays.get(name).copied()
    }

    /// Check whether a service is registered
    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Look up an activity implementation
    pub fn activity_impl(&self, name: &str) -> Option<&ActionFn> {
        self.activities.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_on_merge() {
        let base = MachineOptions::new().delay("SLOW", 1000).delay("FAST", 50);
        let overrides = MachineOptions::new().delay("SLOW", 2000);

        let merged = base.merged_with(&overrides);
        assert_eq!(merged.delay_millis("SLOW"), Some(2000));
        assert_eq!(merged.delay_millis("FAST"), Some(50));
    }

    #[test]
    fn guard_lookup_by_name() {
        let options = MachineOptions::new().guard("belowLimit", |ctx, _event| {
            ctx["count"].as_i64().unwrap_or(0) < 5
        });

        assert!(options.guard_impl("belowLimit").is_some());
        assert!(options.guard_impl("missing").is_none());
    }
}
