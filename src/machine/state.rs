//! State values and the observable state snapshot
//!
//! A [`StateValue`] is the recursive value-form of a configuration: a single
//! key for an atomic leaf, or a mapping for compound and parallel nodes. A
//! [`State`] is the immutable snapshot returned by every step.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::action::{Action, ActionDescriptor};
use super::event::Event;
use super::history::HistoryValue;
use super::node::{NodeId, TransitionDef};
use super::Context;

/// Recursive state value
///
/// Invariants: a compound node is represented by exactly one child key; a
/// parallel node by every non-history child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Atomic leaf, named by its local key
    Leaf(String),
    /// Compound or parallel value, keyed by child key
    Branch(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Leaf value from a key
    pub fn leaf(key: impl Into<String>) -> Self {
        StateValue::Leaf(key.into())
    }

    /// Branch value from key/value pairs
    pub fn branch<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, StateValue)>,
        K: Into<String>,
    {
        StateValue::Branch(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// Parse a delimited path such as `"a.b.c"` into a nested value
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let mut keys: Vec<&str> = path.split(delimiter).collect();
        let leaf = keys.pop().unwrap_or_default();
        let mut value = StateValue::Leaf(leaf.to_string());
        for key in keys.into_iter().rev() {
            let mut map = BTreeMap::new();
            map.insert(key.to_string(), value);
            value = StateValue::Branch(map);
        }
        value
    }

    /// Whether `partial` describes a subtree of this value
    ///
    /// A partial leaf matches a branch that contains it as a key, so
    /// `"red"` matches `{red: "walk"}`.
    pub fn matches(&self, partial: &StateValue) -> bool {
        match (self, partial) {
            (StateValue::Leaf(full), StateValue::Leaf(part)) => full == part,
            (StateValue::Branch(map), StateValue::Leaf(part)) => map.contains_key(part),
            (StateValue::Branch(map), StateValue::Branch(parts)) => parts
                .iter()
                .all(|(key, sub)| map.get(key).is_some_and(|full| full.matches(sub))),
            (StateValue::Leaf(_), StateValue::Branch(_)) => false,
        }
    }

    /// Flatten into delimited path strings, one per represented node
    ///
    /// `{a: {b: "c"}}` becomes `["a", "a.b", "a.b.c"]`.
    pub fn to_strings(&self, delimiter: &str) -> Vec<String> {
        match self {
            StateValue::Leaf(key) => vec![key.clone()],
            StateValue::Branch(map) => {
                let mut out = Vec::new();
                for (key, sub) in map {
                    out.push(key.clone());
                    for inner in sub.to_strings(delimiter) {
                        out.push(format!("{key}{delimiter}{inner}"));
                    }
                }
                out
            }
        }
    }
}

impl From<&str> for StateValue {
    fn from(key: &str) -> Self {
        StateValue::Leaf(key.to_string())
    }
}

impl From<String> for StateValue {
    fn from(key: String) -> Self {
        StateValue::Leaf(key)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Leaf(key) => write!(f, "{key}"),
            StateValue::Branch(map) => {
                write!(f, "{{")?;
                for (i, (key, sub)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {sub}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Opaque reference to a spawned child actor or invoked service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    /// Child id, unique within the machine
    pub id: String,
}

/// Immutable state snapshot produced by a macrostep
#[derive(Debug, Clone)]
pub struct State {
    /// State value of the active configuration
    pub value: StateValue,

    /// Extended state after all assigns of the macrostep
    pub context: Context,

    /// The external event that produced this state
    pub event: Event,

    /// Recorded history subtrees, if the machine has history nodes
    pub history_value: Option<HistoryValue>,

    /// The previous state, its own history cleared to cap memory
    pub prev_state: Option<Box<State>>,

    /// Side-effect actions for the interpreter loop, in canonical order
    pub actions: Vec<Action>,

    /// Activity ids mapped to whether they are running
    pub activities: BTreeMap<String, bool>,

    /// Meta values of active nodes, keyed by node id
    pub meta: BTreeMap<String, Value>,

    /// Active node set, ascending document order
    pub configuration: Vec<NodeId>,

    /// Transitions taken during the macrostep, in selection order
    pub transitions: Vec<Arc<TransitionDef>>,

    /// Invoked children, keyed by invocation id
    pub children: BTreeMap<String, ActorRef>,

    /// Whether the macrostep changed anything; `None` for initial states
    pub changed: Option<bool>,

    /// Whether the machine root reached a final configuration
    pub done: bool,

    pub(crate) next_events: Vec<String>,
}

impl State {
    /// Whether `partial` describes a subtree of this state's value
    pub fn matches(&self, partial: &StateValue) -> bool {
        self.value.matches(partial)
    }

    /// Flatten the state value into delimited path strings
    pub fn to_strings(&self, delimiter: &str) -> Vec<String> {
        self.value.to_strings(delimiter)
    }

    /// Event names that could cause a transition from this state
    pub fn next_events(&self) -> &[String] {
        &self.next_events
    }

    /// Serializable snapshot; configuration and transitions are omitted
    /// because they are recomputable from the value
    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            value: self.value.clone(),
            context: self.context.clone(),
            history_value: self.history_value.clone(),
            actions: self.actions.iter().map(Action::descriptor).collect(),
            activities: self.activities.clone(),
            meta: self.meta.clone(),
            children: self.children.keys().cloned().collect(),
            event: self.event.clone(),
        }
    }
}

/// Persisted state format
///
/// Restore with [`Machine::rehydrate`](super::Machine::rehydrate), which
/// recomputes the configuration from the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// State value
    pub value: StateValue,
    /// Extended state
    pub context: Context,
    /// Recorded history subtrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_value: Option<HistoryValue>,
    /// Emitted action descriptors
    pub actions: Vec<ActionDescriptor>,
    /// Activity run flags
    pub activities: BTreeMap<String, bool>,
    /// Meta values of active nodes
    pub meta: BTreeMap<String, Value>,
    /// Invoked child ids
    pub children: Vec<String>,
    /// The event that produced the state
    #[serde(rename = "_event")]
    pub event: Event,
}
