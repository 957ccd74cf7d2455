//! Declarative machine configuration
//!
//! A [`MachineConfig`] describes the statechart tree before it is compiled
//! into an arena-backed [`Definition`](super::definition::Definition).
//! Ordered `Vec`s everywhere preserve document order, which drives every
//! deterministic tie-break downstream.

use serde_json::Value;

use super::action::{Action, Delay};
use super::guard::Guard;
use super::node::HistoryKind;
use super::Context;

/// Default path delimiter
pub const DEFAULT_DELIMITER: &str = ".";

/// Top-level machine configuration; the root behaves as a compound node
#[derive(Debug, Default)]
pub struct MachineConfig {
    /// Machine key, used to derive node ids
    pub key: String,
    /// Explicit machine id; defaults to the key
    pub id: Option<String>,
    /// Initial child key of the root
    pub initial: Option<String>,
    /// Root is parallel instead of compound
    pub parallel: bool,
    /// Initial extended state
    pub context: Context,
    /// Path delimiter for derived ids and parsed values
    pub delimiter: Option<String>,
    /// Reject events the machine does not declare
    pub strict: bool,
    /// Child states in document order
    pub states: Vec<StateConfig>,
    /// Event handlers on the root, in document order
    pub on: Vec<EventConfig>,
}

impl MachineConfig {
    /// New machine configuration with the given key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            context: Value::Null,
            ..Default::default()
        }
    }

    /// Set the explicit machine id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the initial child key
    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.initial = Some(key.into());
        self
    }

    /// Make the root parallel
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Set the initial context
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Set the path delimiter
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Enable strict mode
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Append a child state
    pub fn state(mut self, state: StateConfig) -> Self {
        self.states.push(state);
        self
    }

    /// Append an event handler on the root
    pub fn on(mut self, event: impl Into<String>, transitions: Vec<TransitionConfig>) -> Self {
        self.on.push(EventConfig {
            event: event.into(),
            transitions,
        });
        self
    }
}

/// Configuration of one state node
#[derive(Debug, Default)]
pub struct StateConfig {
    /// Local key within the parent
    pub key: String,
    /// Explicit node id; defaults to the delimited path
    pub id: Option<String>,
    /// Initial child key (compound only)
    pub initial: Option<String>,
    /// Node is parallel
    pub parallel: bool,
    /// Node is final
    pub final_state: bool,
    /// History depth; present only on history nodes
    pub history: Option<HistoryKind>,
    /// Default target of a history node, as a sibling key
    pub target: Option<String>,
    /// Child states in document order
    pub states: Vec<StateConfig>,
    /// Event handlers in document order; an empty transition list forbids
    /// the event on this node
    pub on: Vec<EventConfig>,
    /// Entry actions
    pub entry: Vec<Action>,
    /// Exit actions
    pub exit: Vec<Action>,
    /// Delayed transitions, desugared at build time
    pub after: Vec<AfterConfig>,
    /// Service invocations
    pub invoke: Vec<InvokeConfig>,
    /// Activities running while the node is active
    pub activities: Vec<String>,
    /// Meta value surfaced while the node is active
    pub meta: Option<Value>,
    /// Done-event payload (final nodes only)
    pub data: Option<Value>,
}

impl StateConfig {
    /// New atomic or compound state
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// New parallel state
    pub fn parallel(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            parallel: true,
            ..Default::default()
        }
    }

    /// New final state
    pub fn final_state(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            final_state: true,
            ..Default::default()
        }
    }

    /// New history state
    pub fn history(key: impl Into<String>, kind: HistoryKind) -> Self {
        Self {
            key: key.into(),
            history: Some(kind),
            ..Default::default()
        }
    }

    /// Set the explicit node id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the initial child key
    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.initial = Some(key.into());
        self
    }

    /// Set the default target of a history node
    pub fn target(mut self, key: impl Into<String>) -> Self {
        self.target = Some(key.into());
        self
    }

    /// Append a child state
    pub fn state(mut self, state: StateConfig) -> Self {
        self.states.push(state);
        self
    }

    /// Append an event handler
    pub fn on(mut self, event: impl Into<String>, transitions: Vec<TransitionConfig>) -> Self {
        self.on.push(EventConfig {
            event: event.into(),
            transitions,
        });
        self
    }

    /// Forbid an event on this node: it is consumed without a transition
    pub fn forbid(mut self, event: impl Into<String>) -> Self {
        self.on.push(EventConfig {
            event: event.into(),
            transitions: Vec::new(),
        });
        self
    }

    /// Append an entry action
    pub fn entry(mut self, action: Action) -> Self {
        self.entry.push(action);
        self
    }

    /// Append an exit action
    pub fn exit(mut self, action: Action) -> Self {
        self.exit.push(action);
        self
    }

    /// Append a delayed transition block
    pub fn after(mut self, delay: Delay, transitions: Vec<TransitionConfig>) -> Self {
        self.after.push(AfterConfig { delay, transitions });
        self
    }

    /// Append a service invocation
    pub fn invoke(mut self, id: impl Into<String>, src: impl Into<String>) -> Self {
        self.invoke.push(InvokeConfig {
            id: id.into(),
            src: src.into(),
        });
        self
    }

    /// Append an activity
    pub fn activity(mut self, id: impl Into<String>) -> Self {
        self.activities.push(id.into());
        self
    }

    /// Set the meta value
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Set the done-event payload of a final state
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Handlers for one event name on one node
#[derive(Debug)]
pub struct EventConfig {
    /// Event name, `""` for the null event or `"*"` for the wildcard
    pub event: String,
    /// Candidate transitions in document order; empty means forbidden
    pub transitions: Vec<TransitionConfig>,
}

/// Configuration of one transition
#[derive(Debug, Default)]
pub struct TransitionConfig {
    /// Target expressions as written; empty for targetless transitions
    pub targets: Vec<String>,
    /// Guard predicate
    pub guard: Option<Guard>,
    /// Delimited state-value predicate, e.g. `"red.walk"`
    pub in_state: Option<String>,
    /// Transition actions in document order
    pub actions: Vec<Action>,
    /// Explicit internal flag; inferred from targets when absent
    pub internal: Option<bool>,
}

impl TransitionConfig {
    /// Transition to a single target
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            targets: vec![target.into()],
            ..Default::default()
        }
    }

    /// Transition to several targets (parallel regions)
    pub fn targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Targetless transition: fires its actions without changing state
    pub fn none() -> Self {
        Self::default()
    }

    /// Attach a guard
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Require the machine to match a state value
    pub fn in_state(mut self, value: impl Into<String>) -> Self {
        self.in_state = Some(value.into());
        self
    }

    /// Append a transition action
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Mark the transition internal
    pub fn internal(mut self) -> Self {
        self.internal = Some(true);
        self
    }
}

/// One delayed transition block
#[derive(Debug)]
pub struct AfterConfig {
    /// Delay before the synthesized event fires
    pub delay: Delay,
    /// Candidate transitions taken when the event arrives
    pub transitions: Vec<TransitionConfig>,
}

/// One service invocation
#[derive(Debug)]
pub struct InvokeConfig {
    /// Invocation id
    pub id: String,
    /// Service source name
    pub src: String,
}
