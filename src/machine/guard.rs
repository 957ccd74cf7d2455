//! Guard predicates controlling transition selection
//!
//! Guards are pure predicates over `(context, event, state)`. Inline
//! predicates carry their closure; named guards are late-bound through the
//! machine options so a machine can be cloned with overrides.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::event::Event;
use super::state::StateValue;
use super::Context;

/// Guard predicate signature
///
/// Returns `Ok(true)` to enable the transition; an `Err` is wrapped into
/// [`MachineError::GuardFailed`](super::MachineError::GuardFailed) and
/// aborts the step.
pub type GuardFn =
    Arc<dyn Fn(&Context, &Event, &GuardArgs<'_>) -> Result<bool, String> + Send + Sync>;

/// Extra inputs available to a guard beyond context and event
pub struct GuardArgs<'a> {
    /// Current state value, pre-transition
    pub state_value: &'a StateValue,
    /// Static parameters of the named guard being evaluated
    pub params: &'a Value,
}

/// Tagged guard variant
#[derive(Clone)]
pub enum Guard {
    /// Inline predicate
    Predicate(GuardFn),
    /// Named guard resolved through machine options
    Named {
        /// Guard kind, used to look up an implementation
        kind: String,
        /// Static parameters passed to the implementation
        params: Value,
    },
}

impl Guard {
    /// Inline infallible predicate over `(context, event)`
    pub fn predicate<F>(pred: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        Guard::Predicate(Arc::new(move |ctx, event, _args| Ok(pred(ctx, event))))
    }

    /// Inline fallible predicate with access to the full guard arguments
    pub fn try_predicate<F>(pred: F) -> Self
    where
        F: Fn(&Context, &Event, &GuardArgs<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        Guard::Predicate(Arc::new(pred))
    }

    /// Named guard with no parameters
    pub fn named(kind: impl Into<String>) -> Self {
        Guard::Named {
            kind: kind.into(),
            params: Value::Null,
        }
    }

    /// Named guard with static parameters
    pub fn named_with(kind: impl Into<String>, params: Value) -> Self {
        Guard::Named {
            kind: kind.into(),
            params,
        }
    }

    /// Discriminator used in error reports
    pub fn kind(&self) -> &str {
        match self {
            Guard::Predicate(_) => "predicate",
            Guard::Named { kind, .. } => kind,
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Predicate(_) => f.write_str("Predicate(..)"),
            Guard::Named { kind, params } => f
                .debug_struct("Named")
                .field("kind", kind)
                .field("params", params)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn predicate_guards_see_context_and_event() {
        let guard = Guard::predicate(|ctx, event| {
            ctx["count"].as_i64().unwrap_or(0) > 0 && event.name == "INC"
        });
        let ctx = json!({ "count": 1 });
        let args = GuardArgs {
            state_value: &StateValue::leaf("active"),
            params: &Value::Null,
        };
        match &guard {
            Guard::Predicate(pred) => {
                assert_eq!(pred(&ctx, &Event::new("INC"), &args), Ok(true));
                assert_eq!(pred(&ctx, &Event::new("DEC"), &args), Ok(false));
            }
            other => panic!("unexpected guard {other:?}"),
        }
    }

    #[test]
    fn guard_kind_reports_named_discriminator() {
        assert_eq!(Guard::named("canSubmit").kind(), "canSubmit");
        assert_eq!(Guard::predicate(|_, _| true).kind(), "predicate");
    }
}
