//! Configuration algebra: operations on sets of active state nodes
//!
//! A configuration is the set of active nodes, closed over ancestors and
//! initial descendants. All set views are ordered by document `order`;
//! exit sets descend, entry sets ascend, and ties are never broken by
//! anything else.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::definition::Definition;
use super::error::{MachineError, Result};
use super::event::EventPattern;
use super::history::{resolve_history, HistoryValue};
use super::node::{NodeId, NodeKind, TransitionDef};
use super::state::StateValue;

/// Set of active state nodes
///
/// Backed by a `BTreeSet` of arena indices; since nodes are allocated in
/// pre-order, iteration yields ascending document order for free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    active: BTreeSet<NodeId>,
}

impl Configuration {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any collection of node ids
    pub fn from_nodes<I: IntoIterator<Item = NodeId>>(nodes: I) -> Self {
        Self {
            active: nodes.into_iter().collect(),
        }
    }

    /// Whether a node is active
    pub fn contains(&self, node: NodeId) -> bool {
        self.active.contains(&node)
    }

    /// Activate a node
    pub fn insert(&mut self, node: NodeId) {
        self.active.insert(node);
    }

    /// Deactivate a node
    pub fn remove(&mut self, node: NodeId) {
        self.active.remove(&node);
    }

    /// Active nodes in ascending document order
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.active.iter().copied()
    }

    /// Active nodes as a vector in ascending document order
    pub fn to_vec(&self) -> Vec<NodeId> {
        self.active.iter().copied().collect()
    }

    /// Number of active nodes
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether the configuration is empty
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Proper ancestors of a node, closest first, root last
pub fn ancestors(def: &Definition, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut current = def.node(node).parent;
    while let Some(parent) = current {
        out.push(parent);
        current = def.node(parent).parent;
    }
    out
}

/// Proper descendants of a node in ascending document order
pub fn descendants(def: &Definition, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = def.node(node).children.iter().rev().copied().collect();
    while let Some(current) = stack.pop() {
        out.push(current);
        stack.extend(def.node(current).children.iter().rev().copied());
    }
    out
}

/// Atomic, final and history leaves beneath a node, ascending order
pub fn leaf_descendants(def: &Definition, node: NodeId) -> Vec<NodeId> {
    descendants(def, node)
        .into_iter()
        .filter(|&n| def.node(n).children.is_empty())
        .collect()
}

/// Whether `node` is a proper descendant of `ancestor`
pub fn is_proper_descendant(def: &Definition, node: NodeId, ancestor: NodeId) -> bool {
    let mut current = def.node(node).parent;
    while let Some(parent) = current {
        if parent == ancestor {
            return true;
        }
        current = def.node(parent).parent;
    }
    false
}

/// Least common compound ancestor of a set of nodes
///
/// The closest proper ancestor of every node whose kind is compound, falling
/// back to the root machine node.
pub fn lcca(def: &Definition, nodes: &[NodeId]) -> NodeId {
    let first = match nodes.first() {
        Some(&n) => n,
        None => return def.root(),
    };
    for candidate in ancestors(def, first) {
        let is_compound_or_root =
            def.node(candidate).kind == NodeKind::Compound || candidate == def.root();
        if is_compound_or_root
            && nodes
                .iter()
                .all(|&n| is_proper_descendant(def, n, candidate))
        {
            return candidate;
        }
    }
    def.root()
}

/// Active leaves: nodes with no active children, ascending order
pub fn leaves(def: &Definition, cfg: &Configuration) -> Vec<NodeId> {
    cfg.iter()
        .filter(|&n| !def.node(n).children.iter().any(|&c| cfg.contains(c)))
        .collect()
}

/// Whether `node` is in a final state under `cfg`
///
/// A compound is in final iff its active child is final; a parallel iff
/// every non-history region is in final.
pub fn is_in_final_state(def: &Definition, cfg: &Configuration, node: NodeId) -> bool {
    let n = def.node(node);
    match n.kind {
        NodeKind::Compound => n
            .children
            .iter()
            .any(|&c| cfg.contains(c) && def.node(c).kind == NodeKind::Final),
        NodeKind::Parallel => n
            .children
            .iter()
            .filter(|&&c| def.node(c).kind != NodeKind::History)
            .all(|&c| is_in_final_state(def, cfg, c)),
        _ => false,
    }
}

/// State value of a configuration
pub fn value_of(def: &Definition, cfg: &Configuration) -> StateValue {
    value_below(def, cfg, def.root())
        .unwrap_or_else(|| StateValue::Leaf(def.node(def.root()).key.clone()))
}

fn value_below(def: &Definition, cfg: &Configuration, node: NodeId) -> Option<StateValue> {
    let active: Vec<NodeId> = def
        .node(node)
        .children
        .iter()
        .copied()
        .filter(|&c| cfg.contains(c))
        .collect();
    if active.is_empty() {
        return None;
    }

    if def.node(node).kind == NodeKind::Parallel {
        let regions = active.into_iter().map(|c| {
            let key = def.node(c).key.clone();
            let inner = value_below(def, cfg, c)
                .unwrap_or_else(|| StateValue::Branch(BTreeMap::new()));
            (key, inner)
        });
        return Some(StateValue::branch(regions));
    }

    let child = active[0];
    let key = def.node(child).key.clone();
    Some(match value_below(def, cfg, child) {
        None => StateValue::Leaf(key),
        Some(inner) => StateValue::branch([(key, inner)]),
    })
}

/// Rebuild a configuration from a fully resolved state value
pub fn configuration_from_value(def: &Definition, value: &StateValue) -> Result<Configuration> {
    let mut cfg = Configuration::new();
    cfg.insert(def.root());
    descend_value(def, &mut cfg, def.root(), value)?;
    Ok(cfg)
}

fn descend_value(
    def: &Definition,
    cfg: &mut Configuration,
    node: NodeId,
    value: &StateValue,
) -> Result<()> {
    match value {
        StateValue::Leaf(key) => {
            let child = def
                .child_by_key(node, key)
                .ok_or_else(|| unknown_state(def, node, key))?;
            cfg.insert(child);
            Ok(())
        }
        StateValue::Branch(map) => {
            for (key, sub) in map {
                let child = def
                    .child_by_key(node, key)
                    .ok_or_else(|| unknown_state(def, node, key))?;
                cfg.insert(child);
                descend_value(def, cfg, child, sub)?;
            }
            Ok(())
        }
    }
}

fn unknown_state(def: &Definition, node: NodeId, key: &str) -> MachineError {
    MachineError::UnknownState(format!(
        "{}{}{}",
        def.node(node).id,
        def.delimiter(),
        key
    ))
}

/// Domain of a transition: the subtree root whose active descendants exit
///
/// `None` means the transition changes no configuration (targetless, or an
/// internal self-transition).
pub fn transition_domain(def: &Definition, t: &TransitionDef) -> Option<NodeId> {
    if t.targets.is_empty() {
        return None;
    }
    if t.internal && t.targets.iter().all(|&tg| tg == t.source) {
        return None;
    }
    if t.internal
        && def.node(t.source).kind == NodeKind::Compound
        && t.targets
            .iter()
            .all(|&tg| is_proper_descendant(def, tg, t.source))
    {
        return Some(t.source);
    }

    let mut span = Vec::with_capacity(t.targets.len() + 1);
    span.push(t.source);
    span.extend_from_slice(&t.targets);
    Some(lcca(def, &span))
}

/// Active proper descendants of `domain`, in descending order (exit order)
pub fn compute_exit_set(def: &Definition, cfg: &Configuration, domain: NodeId) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = cfg
        .iter()
        .filter(|&n| is_proper_descendant(def, n, domain))
        .collect();
    out.reverse();
    out
}

/// Nodes entered by a transition, in ascending order (entry order)
///
/// Two passes, so that sibling regions of a parallel ancestor are only
/// completed with their initial descendants when no explicit target already
/// covers them.
pub fn compute_entry_set(
    def: &Definition,
    domain: Option<NodeId>,
    targets: &[NodeId],
    history: Option<&HistoryValue>,
) -> Vec<NodeId> {
    let mut to_enter = BTreeSet::new();
    for &target in targets {
        add_descendants_to_enter(def, &mut to_enter, target, history);
    }
    for &target in targets {
        add_ancestors_to_enter(def, &mut to_enter, target, domain, history);
    }
    to_enter.into_iter().collect()
}

/// Entry set of the machine's initial configuration (excluding the root)
pub fn initial_entry_set(def: &Definition) -> Vec<NodeId> {
    let mut to_enter = BTreeSet::new();
    add_descendants_to_enter(def, &mut to_enter, def.root(), None);
    to_enter.into_iter().collect()
}

fn add_descendants_to_enter(
    def: &Definition,
    to_enter: &mut BTreeSet<NodeId>,
    node: NodeId,
    history: Option<&HistoryValue>,
) {
    let n = def.node(node);

    if n.kind == NodeKind::History {
        let parent = n.parent.expect("history node always has a parent");
        let resolved = resolve_history(def, history, node);
        for &target in &resolved {
            add_descendants_to_enter(def, to_enter, target, history);
        }
        for &target in &resolved {
            add_ancestors_to_enter(def, to_enter, target, Some(parent), history);
        }
        return;
    }

    to_enter.insert(node);
    match n.kind {
        NodeKind::Compound => {
            // A compound without a declared initial falls back to itself.
            if let Some(child) = def.initial_child(node) {
                add_descendants_to_enter(def, to_enter, child, history);
            }
        }
        NodeKind::Parallel => {
            for &child in &n.children {
                if def.node(child).kind != NodeKind::History {
                    add_descendants_to_enter(def, to_enter, child, history);
                }
            }
        }
        _ => {}
    }
}

fn add_ancestors_to_enter(
    def: &Definition,
    to_enter: &mut BTreeSet<NodeId>,
    node: NodeId,
    stop: Option<NodeId>,
    history: Option<&HistoryValue>,
) {
    for ancestor in ancestors(def, node) {
        if Some(ancestor) == stop {
            break;
        }
        if to_enter.insert(ancestor) && def.node(ancestor).kind == NodeKind::Parallel {
            for &region in &def.node(ancestor).children {
                if def.node(region).kind == NodeKind::History {
                    continue;
                }
                let covered = to_enter
                    .iter()
                    .any(|&m| m == region || is_proper_descendant(def, m, region));
                if !covered {
                    add_descendants_to_enter(def, to_enter, region, history);
                }
            }
        }
    }
}

/// Event names that could fire a transition from this configuration
pub fn next_event_names(def: &Definition, cfg: &Configuration) -> Vec<String> {
    let mut names = BTreeSet::new();
    for node in cfg.iter() {
        for t in &def.node(node).transitions {
            if let EventPattern::Exact(name) = &t.event {
                names.insert(name.clone());
            }
        }
    }
    names.into_iter().collect()
}

/// Check the closure invariants of a configuration
///
/// Every ancestor of an active node is active; every active compound with a
/// declared initial has exactly one active child; every active parallel has
/// all non-history children active.
pub fn satisfies_invariants(def: &Definition, cfg: &Configuration) -> bool {
    for node in cfg.iter() {
        if let Some(parent) = def.node(node).parent {
            if !cfg.contains(parent) {
                return false;
            }
        }
        let n = def.node(node);
        match n.kind {
            NodeKind::Compound => {
                let active_children =
                    n.children.iter().filter(|&&c| cfg.contains(c)).count();
                if n.initial.is_some() {
                    if active_children != 1 {
                        return false;
                    }
                } else if active_children > 1 {
                    return false;
                }
            }
            NodeKind::Parallel => {
                let all_active = n
                    .children
                    .iter()
                    .filter(|&&c| def.node(c).kind != NodeKind::History)
                    .all(|&c| cfg.contains(c));
                if !all_active {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::config::{MachineConfig, StateConfig, TransitionConfig};

    fn nested_def() -> Definition {
        Definition::build(
            MachineConfig::new("m")
                .initial("a")
                .state(
                    StateConfig::new("a")
                        .initial("a1")
                        .state(StateConfig::new("a1"))
                        .state(StateConfig::new("a2"))
                        .on("NEXT", vec![TransitionConfig::target("b")]),
                )
                .state(
                    StateConfig::parallel("b")
                        .state(
                            StateConfig::new("p")
                                .initial("p1")
                                .state(StateConfig::new("p1"))
                                .state(StateConfig::new("p2")),
                        )
                        .state(
                            StateConfig::new("q")
                                .initial("q1")
                                .state(StateConfig::new("q1"))
                                .state(StateConfig::new("q2")),
                        ),
                ),
        )
        .unwrap()
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let def = nested_def();
        let b = def.node_id("m.b").unwrap();
        let ids: Vec<&str> = descendants(&def, b)
            .iter()
            .map(|&n| def.node(n).id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["m.b.p", "m.b.p.p1", "m.b.p.p2", "m.b.q", "m.b.q.q1", "m.b.q.q2"]
        );

        let leaf_ids: Vec<&str> = leaf_descendants(&def, b)
            .iter()
            .map(|&n| def.node(n).id.as_str())
            .collect();
        assert_eq!(leaf_ids, vec!["m.b.p.p1", "m.b.p.p2", "m.b.q.q1", "m.b.q.q2"]);
    }

    #[test]
    fn lcca_is_closest_compound_ancestor() {
        let def = nested_def();
        let a1 = def.node_id("m.a.a1").unwrap();
        let a2 = def.node_id("m.a.a2").unwrap();
        let b = def.node_id("m.b").unwrap();

        assert_eq!(def.node(lcca(&def, &[a1, a2])).id, "m.a");
        assert_eq!(def.node(lcca(&def, &[a1, b])).id, "m");
    }

    #[test]
    fn initial_entry_set_descends_in_order() {
        let def = nested_def();
        let entry = initial_entry_set(&def);
        let ids: Vec<&str> = entry.iter().map(|&n| def.node(n).id.as_str()).collect();
        assert_eq!(ids, vec!["m", "m.a", "m.a.a1"]);
    }

    #[test]
    fn parallel_entry_completes_every_region() {
        let def = nested_def();
        let b = def.node_id("m.b").unwrap();
        let entry = compute_entry_set(&def, Some(def.root()), &[b], None);
        let ids: Vec<&str> = entry.iter().map(|&n| def.node(n).id.as_str()).collect();
        assert_eq!(ids, vec!["m.b", "m.b.p", "m.b.p.p1", "m.b.q", "m.b.q.q1"]);
    }

    #[test]
    fn targeted_region_is_not_overridden_by_completion() {
        let def = nested_def();
        let p2 = def.node_id("m.b.p.p2").unwrap();
        let entry = compute_entry_set(&def, Some(def.root()), &[p2], None);
        let ids: Vec<&str> = entry.iter().map(|&n| def.node(n).id.as_str()).collect();
        assert_eq!(ids, vec!["m.b", "m.b.p", "m.b.p.p2", "m.b.q", "m.b.q.q1"]);
    }

    #[test]
    fn value_round_trips_through_configuration() {
        let def = nested_def();
        let mut cfg = Configuration::new();
        cfg.insert(def.root());
        for node in initial_entry_set(&def) {
            cfg.insert(node);
        }

        let value = value_of(&def, &cfg);
        assert_eq!(
            value,
            StateValue::branch([("a", StateValue::leaf("a1"))])
        );

        let rebuilt = configuration_from_value(&def, &value).unwrap();
        assert_eq!(rebuilt, cfg);
        assert!(satisfies_invariants(&def, &rebuilt));
    }

    #[test]
    fn exit_set_descends_from_domain() {
        let def = nested_def();
        let cfg = configuration_from_value(
            &def,
            &StateValue::branch([("a", StateValue::leaf("a1"))]),
        )
        .unwrap();

        let exits = compute_exit_set(&def, &cfg, def.root());
        let ids: Vec<&str> = exits.iter().map(|&n| def.node(n).id.as_str()).collect();
        assert_eq!(ids, vec!["m.a.a1", "m.a"]);
    }
}
