//! Machine orchestrator and public API
//!
//! This module provides the main [`Machine`] struct that ties the definition,
//! the option tables and the step engine together, and exposes the public
//! interface for embedding the core in an interpreter loop.

use std::fmt;
use std::sync::Arc;

// Submodules
pub mod action;
pub mod config;
pub mod configuration;
pub mod definition;
pub mod error;
pub mod event;
pub mod guard;
pub mod history;
pub mod node;
pub mod options;
pub mod resolver;
pub mod selector;
pub mod state;
pub mod step;

/// Extended state ("context") of a machine
///
/// Contexts are dynamic JSON values, updated only through pure assign
/// actions folded by the step engine.
pub type Context = serde_json::Value;

/// A statechart machine: immutable definition plus late-bound options
///
/// Machines are cheap to clone and share; [`Machine::with_options`] and
/// [`Machine::with_context`] return shallow clones over the same definition.
pub struct Machine {
    definition: Arc<Definition>,
    options: MachineOptions,
    context: Context,
}

impl Machine {
    /// Build a machine from a declarative configuration
    ///
    /// Definition-time errors (invalid initial keys, unresolvable targets,
    /// duplicate ids) abort construction.
    pub fn new(config: MachineConfig) -> Result<Self> {
        let definition = Definition::build(config)?;
        let context = definition.initial_context.clone();
        Ok(Self {
            definition: Arc::new(definition),
            options: MachineOptions::new(),
            context,
        })
    }

    /// Shallow clone with option overrides merged in
    pub fn with_options(&self, overrides: MachineOptions) -> Machine {
        Machine {
            definition: Arc::clone(&self.definition),
            options: self.options.merged_with(&overrides),
            context: self.context.clone(),
        }
    }

    /// Shallow clone with a replaced initial context
    pub fn with_context(&self, context: Context) -> Machine {
        Machine {
            definition: Arc::clone(&self.definition),
            options: self.options.clone(),
            context,
        }
    }

    /// Machine id
    pub fn id(&self) -> &str {
        self.definition.id()
    }

    /// Machine key
    pub fn key(&self) -> &str {
        self.definition.key()
    }

    /// The machine's initial state, with entry actions and any immediate
    /// transient or raised events already processed
    pub fn initial_state(&self) -> Result<State> {
        step::initial_state(&self.definition, &self.options, self.context.clone())
    }

    /// Perform one macrostep
    ///
    /// Runs to completion: transient transitions and raised events are
    /// drained before the state is returned. On error the input state is
    /// left untouched and no partial state escapes.
    pub fn transition(&self, state: &State, event: impl Into<Event>) -> Result<State> {
        step::transition(&self.definition, &self.options, state, event.into())
    }

    /// Perform one macrostep against an explicit context, ignoring the
    /// context recorded on the state
    pub fn transition_with_context(
        &self,
        state: &State,
        event: impl Into<Event>,
        context: Context,
    ) -> Result<State> {
        let mut seeded = state.clone();
        seeded.context = context;
        step::transition(&self.definition, &self.options, &seeded, event.into())
    }

    /// Look up a state node by its globally unique id
    pub fn state_node_by_id(&self, id: &str) -> Option<&node::StateNode> {
        self.definition.node_by_id(id)
    }

    /// The underlying immutable definition
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Normalized, serializable description of the machine
    pub fn document(&self) -> definition::DefinitionDocument {
        self.definition.document()
    }

    /// Expand a partial state value into a full one
    pub fn resolve(&self, value: &StateValue) -> Result<StateValue> {
        step::resolve_value(&self.definition, value)
    }

    /// Restore a state from its persisted form
    pub fn rehydrate(&self, persisted: PersistedState) -> Result<State> {
        let resolved = step::resolve_value(&self.definition, &persisted.value)?;
        step::rehydrate(&self.definition, persisted, resolved)
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.definition.id())
            .field("strict", &self.definition.is_strict())
            .finish()
    }
}

// Re-export commonly used types
pub use action::{Action, ActionDescriptor, Delay, SendAction, SendTarget};
pub use config::{
    AfterConfig, EventConfig, InvokeConfig, MachineConfig, StateConfig, TransitionConfig,
};
pub use configuration::Configuration;
pub use definition::{Definition, DefinitionDocument};
pub use error::{DefinitionError, MachineError, Result};
pub use event::{Event, EventPattern};
pub use guard::{Guard, GuardArgs};
pub use history::HistoryValue;
pub use node::{HistoryKind, NodeId, NodeKind, StateNode, TransitionDef};
pub use options::MachineOptions;
pub use state::{ActorRef, PersistedState, State, StateValue};
