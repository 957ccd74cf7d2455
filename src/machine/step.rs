//! The step engine: macrosteps and run-to-completion
//!
//! A macrostep performs one microstep for the external event, then drains
//! transient (eventless) transitions and the internal FIFO queue until the
//! machine is quiescent. The engine never re-enters itself recursively; the
//! queue is an explicit `VecDeque` local to the step.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use super::action::Action;
use super::configuration::{
    configuration_from_value, initial_entry_set, is_in_final_state, next_event_names, value_of,
    Configuration,
};
use super::definition::Definition;
use super::error::{MachineError, Result};
use super::event::{is_builtin_event, Event, WILDCARD};
use super::history::{update_history_value, HistoryValue};
use super::node::TransitionDef;
use super::options::MachineOptions;
use super::resolver::resolve_step;
use super::selector::{select_microstep, Microstep};
use super::state::{ActorRef, PersistedState, State, StateValue};
use super::Context;

/// Mutable working set of one macrostep
struct StepCursor<'m> {
    def: &'m Definition,
    options: &'m MachineOptions,
    cfg: Configuration,
    context: Context,
    history: Option<HistoryValue>,
    queue: VecDeque<Event>,
    actions: Vec<Action>,
    transitions: Vec<Arc<TransitionDef>>,
    activities: BTreeMap<String, bool>,
    children: BTreeMap<String, ActorRef>,
    assigned: bool,
}

impl<'m> StepCursor<'m> {
    fn from_state(def: &'m Definition, options: &'m MachineOptions, state: &State) -> Self {
        Self {
            def,
            options,
            cfg: Configuration::from_nodes(state.configuration.iter().copied()),
            context: state.context.clone(),
            history: state.history_value.clone(),
            queue: VecDeque::new(),
            actions: Vec::new(),
            transitions: Vec::new(),
            activities: state.activities.clone(),
            children: state.children.clone(),
            assigned: false,
        }
    }

    fn fresh(def: &'m Definition, options: &'m MachineOptions, context: Context) -> Self {
        Self {
            def,
            options,
            cfg: Configuration::new(),
            context,
            history: None,
            queue: VecDeque::new(),
            actions: Vec::new(),
            transitions: Vec::new(),
            activities: BTreeMap::new(),
            children: BTreeMap::new(),
            assigned: false,
        }
    }

    /// Select and apply one microstep; `false` means nothing fired
    fn microstep(&mut self, event: &Event) -> Result<bool> {
        let value = value_of(self.def, &self.cfg);
        let micro = select_microstep(
            self.def,
            self.options,
            &self.cfg,
            &value,
            &self.context,
            event,
            self.history.as_ref(),
        )?;
        if micro.is_empty() {
            return Ok(false);
        }
        self.apply(micro, event)?;
        Ok(true)
    }

    fn apply(&mut self, micro: Microstep, event: &Event) -> Result<()> {
        let resolved = resolve_step(self.def, self.options, &micro, &self.context, event)?;

        self.cfg = micro.configuration;
        self.context = resolved.context;
        self.queue.extend(resolved.raised);
        self.actions.extend(resolved.actions);
        self.transitions.extend(micro.transitions);
        self.assigned |= resolved.assigned;

        for invocation in resolved.invoked {
            self.children
                .insert(invocation.id.clone(), ActorRef { id: invocation.id });
        }
        for id in resolved.stopped {
            // Invocation ids live in `children`; everything else toggles an
            // activity flag.
            if self.children.remove(&id).is_none() {
                self.activities.insert(id, false);
            }
        }
        for id in resolved.started {
            self.activities.insert(id, true);
        }

        let new_value = value_of(self.def, &self.cfg);
        self.history = update_history_value(self.def, self.history.as_ref(), &new_value);
        Ok(())
    }

    /// Drain transient transitions and the internal queue to quiescence
    fn drain(&mut self) -> Result<()> {
        loop {
            while self.microstep(&Event::null())? {}
            match self.queue.pop_front() {
                Some(event) => {
                    self.microstep(&event)?;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn into_state(self, event: Event, prev: Option<&State>) -> State {
        let value = value_of(self.def, &self.cfg);

        let mut meta = BTreeMap::new();
        for node in self.cfg.iter() {
            let n = self.def.node(node);
            if let Some(m) = &n.meta {
                meta.insert(n.id.clone(), m.clone());
            }
        }

        let changed = prev.map(|p| {
            self.assigned || !self.actions.is_empty() || p.value != value
        });
        let prev_state = prev.map(|p| {
            let mut capped = p.clone();
            capped.prev_state = None;
            Box::new(capped)
        });

        let next_events = next_event_names(self.def, &self.cfg);
        let done = is_in_final_state(self.def, &self.cfg, self.def.root());

        State {
            value,
            context: self.context,
            event,
            history_value: self.history,
            prev_state,
            actions: self.actions,
            activities: self.activities,
            meta,
            configuration: self.cfg.to_vec(),
            transitions: self.transitions,
            children: self.children,
            changed,
            done,
            next_events,
        }
    }
}

/// Compute the machine's initial state
pub fn initial_state(
    def: &Definition,
    options: &MachineOptions,
    context: Context,
) -> Result<State> {
    let entry_set = initial_entry_set(def);
    let configuration = Configuration::from_nodes(entry_set.iter().copied());

    let mut cursor = StepCursor::fresh(def, options, context);
    let init = Event::init();
    cursor.apply(
        Microstep {
            transitions: Vec::new(),
            exit_set: Vec::new(),
            entry_set,
            configuration,
        },
        &init,
    )?;
    cursor.drain()?;
    Ok(cursor.into_state(init, None))
}

/// Perform one macrostep: `(state, event) -> state`
///
/// The returned state carries the original external event; intermediate
/// microstep states are never observable.
pub fn transition(
    def: &Definition,
    options: &MachineOptions,
    state: &State,
    event: Event,
) -> Result<State> {
    if event.name == WILDCARD {
        return Err(MachineError::ReservedEvent(WILDCARD.to_string()));
    }
    if def.is_strict() && !is_builtin_event(&event.name) && !def.declares_event(&event.name) {
        return Err(MachineError::UnknownEvent {
            machine: def.id().to_string(),
            event: event.name,
        });
    }

    let mut cursor = StepCursor::from_state(def, options, state);
    cursor.microstep(&event)?;
    cursor.drain()?;
    Ok(cursor.into_state(event, Some(state)))
}

/// Restore a state from its persisted form
///
/// The configuration and derived views are recomputed from the value;
/// emitted actions are not restorable because they carry closures.
pub fn rehydrate(
    def: &Definition,
    persisted: PersistedState,
    resolved_value: StateValue,
) -> Result<State> {
    let cfg = configuration_from_value(def, &resolved_value)?;

    let mut meta = BTreeMap::new();
    for node in cfg.iter() {
        let n = def.node(node);
        if let Some(m) = &n.meta {
            meta.insert(n.id.clone(), m.clone());
        }
    }

    let next_events = next_event_names(def, &cfg);
    let done = is_in_final_state(def, &cfg, def.root());
    let children = persisted
        .children
        .into_iter()
        .map(|id| (id.clone(), ActorRef { id }))
        .collect();

    Ok(State {
        value: resolved_value,
        context: persisted.context,
        event: persisted.event,
        history_value: persisted.history_value,
        prev_state: None,
        actions: Vec::new(),
        activities: persisted.activities,
        meta: persisted.meta,
        configuration: cfg.to_vec(),
        transitions: Vec::new(),
        children,
        changed: None,
        done,
        next_events,
    })
}

/// Resolve a partial state value into a full one
///
/// Missing children of compounds fill in with their initial; partial
/// parallels fill in missing regions with their initial.
pub fn resolve_value(def: &Definition, value: &StateValue) -> Result<StateValue> {
    resolve_under(def, def.root(), value)
}

fn resolve_under(
    def: &Definition,
    node: super::node::NodeId,
    value: &StateValue,
) -> Result<StateValue> {
    use super::node::NodeKind;

    match value {
        StateValue::Leaf(key) => {
            let child = def
                .child_by_key(node, key)
                .ok_or_else(|| unknown(def, node, key))?;
            Ok(match def.initial_value_below(child) {
                None => StateValue::Leaf(key.clone()),
                Some(initial) => StateValue::branch([(key.clone(), initial.clone())]),
            })
        }
        StateValue::Branch(map) => {
            if map.is_empty() {
                return Ok(def
                    .initial_value_below(node)
                    .cloned()
                    .unwrap_or_else(|| StateValue::Branch(BTreeMap::new())));
            }

            let n = def.node(node);
            if n.kind == NodeKind::Parallel {
                let mut out = BTreeMap::new();
                for &region in &n.children {
                    let r = def.node(region);
                    if r.kind == NodeKind::History {
                        continue;
                    }
                    let entry = match map.get(&r.key) {
                        Some(sub) => resolve_under(def, region, sub)?,
                        None => def
                            .initial_value_below(region)
                            .cloned()
                            .unwrap_or_else(|| StateValue::Branch(BTreeMap::new())),
                    };
                    out.insert(r.key.clone(), entry);
                }
                return Ok(StateValue::Branch(out));
            }

            if map.len() > 1 {
                return Err(MachineError::UnknownState(format!(
                    "value names {} children of non-parallel state '{}'",
                    map.len(),
                    n.id
                )));
            }
            let (key, sub) = map.iter().next().expect("map is non-empty");
            let child = def
                .child_by_key(node, key)
                .ok_or_else(|| unknown(def, node, key))?;
            Ok(StateValue::branch([(
                key.clone(),
                resolve_under(def, child, sub)?,
            )]))
        }
    }
}

fn unknown(def: &Definition, node: super::node::NodeId, key: &str) -> MachineError {
    MachineError::UnknownState(format!(
        "{}{}{}",
        def.node(node).id,
        def.delimiter(),
        key
    ))
}
