//! Arena-backed machine definition and its builder
//!
//! Compiles a [`MachineConfig`] into an immutable tree of [`StateNode`]s:
//! pre-order numbering, id derivation, target resolution, desugaring of
//! delayed transitions, and validation. Construction errors are fatal;
//! repairable defects are reported through `tracing::warn!`.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::action::{Action, SendAction, SendTarget};
use super::config::{AfterConfig, EventConfig, MachineConfig, StateConfig, DEFAULT_DELIMITER};
use super::error::{DefinitionError, MachineError, Result};
use super::event::{after_event_name, Event, EventPattern, WILDCARD};
use super::node::{InvokeDef, NodeId, NodeKind, StateNode, TransitionDef};
use super::state::StateValue;
use super::Context;

/// Immutable, shareable machine definition
#[derive(Debug)]
pub struct Definition {
    key: String,
    id: String,
    delimiter: String,
    strict: bool,
    root: NodeId,
    nodes: Vec<StateNode>,
    ids: HashMap<String, NodeId>,
    event_names: HashSet<String>,
    pub(crate) initial_context: Context,

    /// Candidate transitions per (node, event name); a pure function of the
    /// immutable definition, computed lazily
    candidate_cache: RwLock<HashMap<(NodeId, String), Arc<Vec<Arc<TransitionDef>>>>>,
}

#[derive(Default)]
struct PendingNode {
    on: Vec<EventConfig>,
    after: Vec<AfterConfig>,
    history_target: Option<String>,
}

struct Builder {
    machine_id: String,
    delimiter: String,
    nodes: Vec<StateNode>,
    pending: Vec<PendingNode>,
    ids: HashMap<String, NodeId>,
    event_names: HashSet<String>,
}

impl Definition {
    /// Compile a machine configuration into a definition
    pub fn build(config: MachineConfig) -> Result<Self> {
        if config.key.is_empty() {
            return Err(DefinitionError::InvalidConfig("machine key is empty".into()).into());
        }

        let delimiter = config
            .delimiter
            .clone()
            .unwrap_or_else(|| DEFAULT_DELIMITER.to_string());
        let machine_id = config.id.clone().unwrap_or_else(|| config.key.clone());
        let initial_context = config.context;

        let root_config = StateConfig {
            key: config.key.clone(),
            id: Some(machine_id.clone()),
            initial: config.initial,
            parallel: config.parallel,
            states: config.states,
            on: config.on,
            ..Default::default()
        };

        let mut builder = Builder {
            machine_id,
            delimiter: delimiter.clone(),
            nodes: Vec::new(),
            pending: Vec::new(),
            ids: HashMap::new(),
            event_names: HashSet::new(),
        };

        let root = builder.alloc(root_config, None, Vec::new())?;
        builder.link_transitions()?;
        builder.validate()?;

        Ok(Definition {
            key: config.key,
            id: builder.machine_id.clone(),
            delimiter,
            strict: config.strict,
            root,
            nodes: builder.nodes,
            ids: builder.ids,
            event_names: builder.event_names,
            initial_context,
            candidate_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Machine key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Machine id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path delimiter
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Whether the machine rejects undeclared events
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node by arena index
    pub fn node(&self, id: NodeId) -> &StateNode {
        &self.nodes[id.0]
    }

    /// All nodes in document order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &StateNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Node by its globally unique id
    pub fn node_by_id(&self, id: &str) -> Option<&StateNode> {
        self.ids.get(id).map(|&n| self.node(n))
    }

    /// Arena index of a node id
    pub fn node_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Whether the machine declares an event name on any transition
    pub fn declares_event(&self, name: &str) -> bool {
        self.event_names.contains(name)
    }

    /// Child of `node` with the given local key
    pub fn child_by_key(&self, node: NodeId, key: &str) -> Option<NodeId> {
        self.node(node)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).key == key)
    }

    /// Declared initial child of a compound node
    ///
    /// `None` for non-compound nodes and for compounds without a declared
    /// initial, which fall back to themselves.
    pub fn initial_child(&self, node: NodeId) -> Option<NodeId> {
        let n = self.node(node);
        if n.kind != NodeKind::Compound {
            return None;
        }
        n.initial.as_deref().and_then(|key| self.child_by_key(node, key))
    }

    /// Candidate transitions on `node` whose pattern matches `event_name`
    ///
    /// Guards are not evaluated here; the result is a pure function of the
    /// definition and is cached.
    pub fn candidates(&self, node: NodeId, event_name: &str) -> Arc<Vec<Arc<TransitionDef>>> {
        let cache_key = (node, event_name.to_string());
        if let Some(cached) = self.candidate_cache.read().get(&cache_key) {
            return Arc::clone(cached);
        }

        let computed: Vec<Arc<TransitionDef>> = self
            .node(node)
            .transitions
            .iter()
            .filter(|t| t.event.matches(event_name))
            .cloned()
            .collect();
        let computed = Arc::new(computed);
        self.candidate_cache
            .write()
            .insert(cache_key, Arc::clone(&computed));
        computed
    }

    /// The initial state value below `node`; `None` when the node itself is
    /// the leaf of its initial configuration
    pub(crate) fn initial_value_below(&self, node: NodeId) -> Option<&StateValue> {
        self.node(node)
            .initial_value
            .get_or_init(|| self.compute_initial_below(node))
            .as_ref()
    }

    fn compute_initial_below(&self, node: NodeId) -> Option<StateValue> {
        let n = self.node(node);
        match n.kind {
            NodeKind::Atomic | NodeKind::Final | NodeKind::History => None,
            NodeKind::Compound => {
                let child = self.initial_child(node)?;
                let key = self.node(child).key.clone();
                Some(match self.compute_initial_below(child) {
                    None => StateValue::Leaf(key),
                    Some(inner) => StateValue::branch([(key, inner)]),
                })
            }
            NodeKind::Parallel => {
                let regions = n
                    .children
                    .iter()
                    .filter(|&&c| self.node(c).kind != NodeKind::History)
                    .map(|&c| {
                        let key = self.node(c).key.clone();
                        let inner = self
                            .compute_initial_below(c)
                            .unwrap_or_else(|| StateValue::Branch(Default::default()));
                        (key, inner)
                    });
                Some(StateValue::branch(regions))
            }
        }
    }

    /// The machine's full initial state value
    pub fn initial_machine_value(&self) -> StateValue {
        self.initial_value_below(self.root)
            .cloned()
            .unwrap_or_else(|| StateValue::Leaf(self.node(self.root).key.clone()))
    }

    /// Normalized, serializable description of the machine
    pub fn document(&self) -> DefinitionDocument {
        DefinitionDocument {
            id: self.id.clone(),
            key: self.key.clone(),
            delimiter: self.delimiter.clone(),
            strict: self.strict,
            states: self
                .nodes()
                .map(|(_, n)| NodeDocument {
                    id: n.id.clone(),
                    key: n.key.clone(),
                    kind: n.kind,
                    order: n.order,
                    initial: n.initial.clone(),
                    parent: n.parent.map(|p| self.node(p).id.clone()),
                    children: n.children.iter().map(|&c| self.node(c).id.clone()).collect(),
                    transitions: n
                        .transitions
                        .iter()
                        .map(|t| TransitionDocument {
                            event: t.event.as_str().to_string(),
                            targets: t
                                .targets
                                .iter()
                                .map(|&tg| self.node(tg).id.clone())
                                .collect(),
                            internal: t.internal,
                            guarded: t.guard.is_some() || t.in_state.is_some(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl Builder {
    fn alloc(
        &mut self,
        config: StateConfig,
        parent: Option<NodeId>,
        path: Vec<String>,
    ) -> Result<NodeId> {
        let kind = if config.history.is_some() {
            NodeKind::History
        } else if config.final_state {
            NodeKind::Final
        } else if config.parallel {
            NodeKind::Parallel
        } else if !config.states.is_empty() {
            NodeKind::Compound
        } else {
            NodeKind::Atomic
        };

        if matches!(kind, NodeKind::History | NodeKind::Final) && !config.states.is_empty() {
            return Err(DefinitionError::InvalidConfig(format!(
                "{} state '{}' cannot have children",
                if kind == NodeKind::History { "history" } else { "final" },
                config.key
            ))
            .into());
        }

        let id = config.id.clone().unwrap_or_else(|| {
            if path.is_empty() {
                self.machine_id.clone()
            } else {
                format!("{}{}{}", self.machine_id, self.delimiter, path.join(&self.delimiter))
            }
        });

        let node_id = NodeId(self.nodes.len());
        if self.ids.insert(id.clone(), node_id).is_some() {
            return Err(DefinitionError::DuplicateId(id).into());
        }

        self.nodes.push(StateNode {
            id,
            key: config.key,
            path: path.clone(),
            kind,
            order: node_id.0 as u32,
            initial: config.initial,
            history: config.history,
            history_target: Vec::new(),
            entry: config.entry,
            exit: config.exit,
            transitions: Vec::new(),
            forbidden: HashSet::new(),
            invocations: config
                .invoke
                .into_iter()
                .map(|i| InvokeDef { id: i.id, src: i.src })
                .collect(),
            activities: config.activities,
            meta: config.meta,
            done_data: config.data,
            parent,
            children: Vec::new(),
            has_history_descendant: false,
            initial_value: Default::default(),
        });
        self.pending.push(PendingNode {
            on: config.on,
            after: config.after,
            history_target: config.target,
        });

        for child_config in config.states {
            let mut child_path = path.clone();
            child_path.push(child_config.key.clone());
            let child = self.alloc(child_config, Some(node_id), child_path)?;
            self.nodes[node_id.0].children.push(child);
        }

        Ok(node_id)
    }

    fn link_transitions(&mut self) -> Result<()> {
        for idx in 0..self.nodes.len() {
            let node_id = NodeId(idx);
            let pending = std::mem::take(&mut self.pending[idx]);

            let mut transitions = Vec::new();
            let mut forbidden = HashSet::new();
            let mut extra_entry = Vec::new();
            let mut extra_exit = Vec::new();

            for handler in pending.on {
                if handler.transitions.is_empty() {
                    // Forbidden events are still declared events: a strict
                    // machine consumes them instead of rejecting them.
                    if !handler.event.is_empty() && handler.event != WILDCARD {
                        self.event_names.insert(handler.event.clone());
                    }
                    forbidden.insert(handler.event);
                    continue;
                }
                for tc in handler.transitions {
                    transitions.push(self.build_transition(node_id, &handler.event, tc)?);
                }
            }

            for after in pending.after {
                let event_name =
                    after_event_name(&after.delay.to_string(), &self.nodes[idx].id);
                extra_entry.push(Action::Send(SendAction {
                    event: Event::new(&event_name),
                    delay: Some(after.delay.clone()),
                    id: event_name.clone(),
                    to: SendTarget::Internal,
                }));
                extra_exit.push(Action::cancel(&event_name));
                for tc in after.transitions {
                    transitions.push(self.build_transition(node_id, &event_name, tc)?);
                }
            }

            let resolved_history_target = match pending.history_target {
                Some(spec) => vec![self.resolve_target(node_id, &spec)?],
                None => Vec::new(),
            };

            let node = &mut self.nodes[idx];
            node.transitions = transitions;
            node.forbidden = forbidden;
            node.entry.extend(extra_entry);
            node.exit.extend(extra_exit);
            node.history_target = resolved_history_target;
        }
        Ok(())
    }

    fn build_transition(
        &self,
        source: NodeId,
        event_spec: &str,
        config: super::config::TransitionConfig,
    ) -> Result<Arc<TransitionDef>> {
        let pattern = EventPattern::parse(event_spec);

        let mut targets = Vec::with_capacity(config.targets.len());
        for spec in &config.targets {
            targets.push(self.resolve_target(source, spec)?);
        }

        let all_relative = !config.targets.is_empty()
            && config.targets.iter().all(|s| s.starts_with(&self.delimiter));
        let internal = config
            .internal
            .unwrap_or(config.targets.is_empty() || all_relative);

        let in_state = config
            .in_state
            .map(|spec| StateValue::parse(&spec, &self.delimiter));

        Ok(Arc::new(TransitionDef {
            event: pattern,
            guard: config.guard,
            in_state,
            targets,
            actions: config.actions,
            internal,
            source,
        }))
    }

    fn resolve_target(&self, source: NodeId, spec: &str) -> Result<NodeId> {
        // Absolute reference by id.
        if let Some(id) = spec.strip_prefix('#') {
            return self
                .ids
                .get(id)
                .copied()
                .ok_or_else(|| self.invalid_target(source, spec));
        }

        // Leading delimiter: descend from the source by keys.
        if let Some(rest) = spec.strip_prefix(&self.delimiter) {
            let mut current = source;
            for key in rest.split(&self.delimiter) {
                current = self
                    .child_key(current, key)
                    .ok_or_else(|| self.invalid_target(source, spec))?;
            }
            return Ok(current);
        }

        // Sibling key, resolved within the parent (the source itself counts).
        if let Some(parent) = self.nodes[source.0].parent {
            if let Some(found) = self.child_key(parent, spec) {
                return Ok(found);
            }
        }

        // Child of the source (covers targets written on the root).
        if let Some(found) = self.child_key(source, spec) {
            return Ok(found);
        }

        // Last resort: a bare globally unique id.
        self.ids
            .get(spec)
            .copied()
            .ok_or_else(|| self.invalid_target(source, spec))
    }

    fn child_key(&self, node: NodeId, key: &str) -> Option<NodeId> {
        self.nodes[node.0]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].key == key)
    }

    fn invalid_target(&self, source: NodeId, spec: &str) -> MachineError {
        DefinitionError::InvalidTarget {
            source_id: self.nodes[source.0].id.clone(),
            target: spec.to_string(),
        }
        .into()
    }

    fn validate(&mut self) -> Result<()> {
        // Initial keys must name existing children; a compound without a
        // declared initial is a warning and falls back to itself.
        for node in &self.nodes {
            if node.kind != NodeKind::Compound {
                continue;
            }
            match node.initial.as_deref() {
                Some(key) => {
                    if !node
                        .children
                        .iter()
                        .any(|&c| self.nodes[c.0].key == key)
                    {
                        return Err(DefinitionError::InvalidInitial {
                            state_id: node.id.clone(),
                            initial: key.to_string(),
                        }
                        .into());
                    }
                }
                None => {
                    tracing::warn!(
                        state = %node.id,
                        "compound state has no initial state; falling back to the state itself"
                    );
                }
            }
        }

        // History descendant flags, bottom-up (children always follow their
        // parent in the arena).
        for idx in (0..self.nodes.len()).rev() {
            let has = self.nodes[idx].children.iter().any(|&c| {
                self.nodes[c.0].kind == NodeKind::History
                    || self.nodes[c.0].has_history_descendant
            });
            self.nodes[idx].has_history_descendant = has;
        }

        // Record declared event names and warn on unreachable candidates:
        // an unguarded transition shadows later candidates on the same
        // pattern.
        for node in &self.nodes {
            let mut shadowed: HashSet<&str> = HashSet::new();
            for t in &node.transitions {
                if let EventPattern::Exact(name) = &t.event {
                    self.event_names.insert(name.clone());
                }
                let pattern = t.event.as_str();
                if shadowed.contains(pattern) {
                    tracing::warn!(
                        state = %node.id,
                        event = %pattern,
                        "transition is unreachable: an earlier unguarded transition always wins"
                    );
                } else if t.guard.is_none() && t.in_state.is_none() {
                    shadowed.insert(pattern);
                }
            }
        }

        Ok(())
    }
}

/// Serializable, normalized machine description
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionDocument {
    /// Machine id
    pub id: String,
    /// Machine key
    pub key: String,
    /// Path delimiter
    pub delimiter: String,
    /// Strict mode flag
    pub strict: bool,
    /// Every node in document order
    pub states: Vec<NodeDocument>,
}

/// Serializable description of one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeDocument {
    /// Node id
    pub id: String,
    /// Local key
    pub key: String,
    /// Node kind
    pub kind: NodeKind,
    /// Document order
    pub order: u32,
    /// Declared initial child key
    pub initial: Option<String>,
    /// Parent node id
    pub parent: Option<String>,
    /// Child node ids in document order
    pub children: Vec<String>,
    /// Transitions in document order
    pub transitions: Vec<TransitionDocument>,
}

/// Serializable description of one transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionDocument {
    /// Event pattern as written
    pub event: String,
    /// Target node ids
    pub targets: Vec<String>,
    /// Internal flag after inference
    pub internal: bool,
    /// Whether a guard or in-state predicate is attached
    pub guarded: bool,
}
