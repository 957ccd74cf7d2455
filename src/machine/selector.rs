//! Transition selection: computing one microstep
//!
//! For every active atomic leaf the selector walks inner-to-outer, takes the
//! first candidate whose pattern, guard and in-state predicate all pass, and
//! then resolves cross-region conflicts by ascending source order.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::configuration::{
    compute_entry_set, compute_exit_set, leaves, transition_domain, Configuration,
};
use super::definition::Definition;
use super::error::{MachineError, Result};
use super::event::Event;
use super::guard::{Guard, GuardArgs};
use super::history::HistoryValue;
use super::node::{NodeId, TransitionDef};
use super::options::MachineOptions;
use super::state::StateValue;
use super::Context;

/// One microstep: the admitted transitions and the resulting sets
#[derive(Debug)]
pub struct Microstep {
    /// Admitted transitions, ascending source order
    pub transitions: Vec<Arc<TransitionDef>>,
    /// Nodes exited, descending order
    pub exit_set: Vec<NodeId>,
    /// Nodes entered, ascending order
    pub entry_set: Vec<NodeId>,
    /// Configuration after the microstep
    pub configuration: Configuration,
}

impl Microstep {
    /// Whether the microstep fires no transition
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Select the enabled transition set for one event and compute its sets
pub fn select_microstep(
    def: &Definition,
    options: &MachineOptions,
    cfg: &Configuration,
    value: &StateValue,
    context: &Context,
    event: &Event,
    history: Option<&HistoryValue>,
) -> Result<Microstep> {
    // One transition at most per active atomic region; a forbidden entry
    // consumes the event for that region without selecting anything.
    let mut selected: Vec<Arc<TransitionDef>> = Vec::new();
    'regions: for leaf in leaves(def, cfg) {
        let mut walk = Some(leaf);
        while let Some(node) = walk {
            let n = def.node(node);
            if n.forbidden.contains(&event.name) {
                continue 'regions;
            }
            for t in def.candidates(node, &event.name).iter() {
                if transition_enabled(def, options, t, context, event, value)? {
                    if !selected.iter().any(|s| Arc::ptr_eq(s, t)) {
                        selected.push(Arc::clone(t));
                    }
                    continue 'regions;
                }
            }
            walk = n.parent;
        }
    }

    // Preemption by document order: a transition whose exit set intersects
    // an already admitted one is discarded.
    selected.sort_by_key(|t| def.node(t.source).order);

    let mut transitions = Vec::new();
    let mut exit_union: BTreeSet<NodeId> = BTreeSet::new();
    let mut entry_union: BTreeSet<NodeId> = BTreeSet::new();
    for t in selected {
        let domain = transition_domain(def, &t);
        let exit_set = match domain {
            Some(d) => compute_exit_set(def, cfg, d),
            None => Vec::new(),
        };
        if exit_set.iter().any(|n| exit_union.contains(n)) {
            continue;
        }
        let entry_set = match domain {
            Some(d) => compute_entry_set(def, Some(d), &t.targets, history),
            None => Vec::new(),
        };
        exit_union.extend(exit_set);
        entry_union.extend(entry_set);
        transitions.push(t);
    }

    let mut configuration = cfg.clone();
    for &node in &exit_union {
        configuration.remove(node);
    }
    for &node in &entry_union {
        configuration.insert(node);
    }

    // BTreeSet iteration ascends; exits run deepest-first.
    let mut exit_set: Vec<NodeId> = exit_union.into_iter().collect();
    exit_set.reverse();
    let entry_set: Vec<NodeId> = entry_union.into_iter().collect();

    Ok(Microstep {
        transitions,
        exit_set,
        entry_set,
        configuration,
    })
}

fn transition_enabled(
    def: &Definition,
    options: &MachineOptions,
    t: &TransitionDef,
    context: &Context,
    event: &Event,
    value: &StateValue,
) -> Result<bool> {
    if let Some(in_state) = &t.in_state {
        if !value.matches(in_state) {
            return Ok(false);
        }
    }

    let guard = match &t.guard {
        None => return Ok(true),
        Some(guard) => guard,
    };

    let null_params = Value::Null;
    let (pred, params, kind) = match guard {
        Guard::Predicate(pred) => (pred, &null_params, "predicate".to_string()),
        Guard::Named { kind, params } => {
            let pred = options
                .guard_impl(kind)
                .ok_or_else(|| MachineError::UnknownGuardRef(kind.clone()))?;
            (pred, params, kind.clone())
        }
    };

    let args = GuardArgs {
        state_value: value,
        params,
    };
    pred(context, event, &args).map_err(|reason| MachineError::GuardFailed {
        guard_kind: kind,
        event: event.name.clone(),
        source_id: def.node(t.source).id.clone(),
        reason,
    })
}
