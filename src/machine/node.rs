//! State node model: the immutable definition tree
//!
//! Nodes live in an arena owned by [`Definition`](super::definition::Definition);
//! parent and child references are arena indices, so the bidirectional tree
//! carries no reference cycles.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::action::Action;
use super::event::EventPattern;
use super::guard::Guard;
use super::state::StateValue;

/// Arena index of a state node
///
/// Nodes are allocated in pre-order, so the index order coincides with the
/// document `order` used for deterministic tie-breaks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Leaf state with no children
    Atomic,
    /// XOR composite: exactly one child active at a time
    Compound,
    /// AND composite: every non-history child active at once
    Parallel,
    /// History pseudo-state restoring a recorded configuration
    History,
    /// Final state; entering it raises a done-event on the parent
    Final,
}

/// History depth of a history node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    /// Restore the most recent active direct child
    Shallow,
    /// Restore the most recent active subtree at every level
    Deep,
}

/// Opaque service invocation attached to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeDef {
    /// Invocation id, unique within the machine
    pub id: String,
    /// Service source name resolved through machine options
    pub src: String,
}

/// A transition as stored on its source node
#[derive(Debug, Clone)]
pub struct TransitionDef {
    /// Event pattern this transition fires on
    pub event: EventPattern,
    /// Guard predicate, if any
    pub guard: Option<Guard>,
    /// State-value predicate: the machine must match this value
    pub in_state: Option<StateValue>,
    /// Resolved target nodes; empty for targetless transitions
    pub targets: Vec<NodeId>,
    /// Actions executed between exits and entries
    pub actions: Vec<Action>,
    /// Internal transitions do not exit their source's subtree root
    pub internal: bool,
    /// Source node
    pub source: NodeId,
}

/// Immutable node of the definition tree
#[derive(Debug)]
pub struct StateNode {
    /// Globally unique id within the machine
    pub id: String,

    /// Local key within the parent
    pub key: String,

    /// Ordered keys from the root to this node
    pub path: Vec<String>,

    /// Node kind
    pub kind: NodeKind,

    /// Pre-order DFS number, the deterministic tie-break
    pub order: u32,

    /// Initial child key (compound only)
    pub initial: Option<String>,

    /// History depth (history nodes only)
    pub history: Option<HistoryKind>,

    /// Resolved default target of a history node
    pub history_target: Vec<NodeId>,

    /// Entry actions, in document order
    pub entry: Vec<Action>,

    /// Exit actions, in document order
    pub exit: Vec<Action>,

    /// Transitions in document order; delayed transitions are appended
    pub transitions: Vec<Arc<TransitionDef>>,

    /// Event names explicitly forbidden on this node
    pub forbidden: HashSet<String>,

    /// Service invocations started on entry and stopped on exit
    pub invocations: Vec<InvokeDef>,

    /// Activities started on entry and stopped on exit
    pub activities: Vec<String>,

    /// Meta value surfaced on states while this node is active
    pub meta: Option<Value>,

    /// Done-event payload (final nodes only)
    pub done_data: Option<Value>,

    /// Parent node; `None` for the root
    pub parent: Option<NodeId>,

    /// Children in document order
    pub children: Vec<NodeId>,

    /// Whether any descendant is a history node
    pub(crate) has_history_descendant: bool,

    /// Lazily computed initial state value below this node
    pub(crate) initial_value: OnceCell<Option<StateValue>>,
}

impl StateNode {
    /// Whether this node can appear as a leaf of a configuration
    pub fn is_leaf_kind(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic | NodeKind::Final | NodeKind::History)
    }
}
