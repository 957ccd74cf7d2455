//! History recording and resolution
//!
//! After every microstep that changes configuration the engine re-records
//! the active subtree under every node with a history descendant. When a
//! transition targets a history node the recorded subtree is turned back
//! into entry targets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::definition::Definition;
use super::node::{HistoryKind, NodeId};
use super::state::StateValue;

/// Recorded history for one node: the subtree value when the node was last
/// active, plus nested records for descendants that carry history themselves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryValue {
    /// Active subtree under the node when it was last active
    pub current: StateValue,
    /// Nested records, keyed by child key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, HistoryValue>,
}

/// Re-record history from the machine value after a configuration change
///
/// Subtrees of currently inactive nodes keep their previous record, so the
/// "most recent active" reading survives exits.
pub fn update_history_value(
    def: &Definition,
    prev: Option<&HistoryValue>,
    machine_value: &StateValue,
) -> Option<HistoryValue> {
    if !def.node(def.root()).has_history_descendant {
        return None;
    }
    update_node(def, def.root(), Some(machine_value), prev)
}

fn update_node(
    def: &Definition,
    node: NodeId,
    value_under: Option<&StateValue>,
    prev: Option<&HistoryValue>,
) -> Option<HistoryValue> {
    let value = match value_under {
        Some(value) => value,
        // Inactive: nothing new to record below this node.
        None => return prev.cloned(),
    };

    let mut children = BTreeMap::new();
    for &child in &def.node(node).children {
        if !def.node(child).has_history_descendant {
            continue;
        }
        let key = def.node(child).key.clone();
        let sub_value = subtree(value, &key);
        let sub_prev = prev.and_then(|p| p.children.get(&key));
        if let Some(hv) = update_node(def, child, sub_value, sub_prev) {
            children.insert(key, hv);
        }
    }

    Some(HistoryValue {
        current: value.clone(),
        children,
    })
}

fn subtree<'a>(value: &'a StateValue, child_key: &str) -> Option<&'a StateValue> {
    match value {
        // The child is active as a leaf; nothing below it.
        StateValue::Leaf(_) => None,
        StateValue::Branch(map) => map.get(child_key),
    }
}

/// Resolve a history node into entry targets
///
/// Stored value first, then the node's default target, then the parent's
/// initial child. Shallow history restores only the top-level children;
/// deep history restores the leaves of the full recorded subtree.
pub fn resolve_history(
    def: &Definition,
    history: Option<&HistoryValue>,
    history_node: NodeId,
) -> Vec<NodeId> {
    let node = def.node(history_node);
    let parent = node.parent.expect("history node always has a parent");

    if let Some(hv) = history.and_then(|root| record_at(def, root, parent)) {
        return match node.history {
            Some(HistoryKind::Deep) => deep_targets(def, parent, &hv.current),
            _ => shallow_targets(def, parent, &hv.current),
        };
    }

    if !node.history_target.is_empty() {
        return node.history_target.clone();
    }

    match def.initial_child(parent) {
        Some(initial) => vec![initial],
        None => Vec::new(),
    }
}

fn record_at<'a>(
    def: &Definition,
    root: &'a HistoryValue,
    node: NodeId,
) -> Option<&'a HistoryValue> {
    let mut hv = root;
    for key in &def.node(node).path {
        hv = hv.children.get(key)?;
    }
    Some(hv)
}

fn shallow_targets(def: &Definition, parent: NodeId, value: &StateValue) -> Vec<NodeId> {
    match value {
        StateValue::Leaf(key) => def.child_by_key(parent, key).into_iter().collect(),
        StateValue::Branch(map) => map
            .keys()
            .filter_map(|key| def.child_by_key(parent, key))
            .collect(),
    }
}

fn deep_targets(def: &Definition, node: NodeId, value: &StateValue) -> Vec<NodeId> {
    match value {
        StateValue::Leaf(key) => def.child_by_key(node, key).into_iter().collect(),
        StateValue::Branch(map) => map
            .iter()
            .filter_map(|(key, sub)| {
                def.child_by_key(node, key).map(|child| {
                    let inner = deep_targets(def, child, sub);
                    if inner.is_empty() {
                        vec![child]
                    } else {
                        inner
                    }
                })
            })
            .flatten()
            .collect(),
    }
}
