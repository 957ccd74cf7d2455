//! Error types for the statechart core
//!
//! Domain errors use thiserror, with definition-time errors split out so
//! machine construction can fail with a dedicated taxonomy.

use thiserror::Error;

/// Top-level machine error
#[derive(Debug, Error)]
pub enum MachineError {
    /// Definition-time errors raised while building a machine
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// A state value names an id or path that does not exist in the machine
    #[error("Unknown state '{0}'")]
    UnknownState(String),

    /// Strict mode: the machine does not declare this event
    #[error("Machine '{machine}' does not accept event '{event}'")]
    UnknownEvent {
        /// Machine id
        machine: String,
        /// Offending event name
        event: String,
    },

    /// A guard predicate reported a failure while being evaluated
    #[error("Guard '{guard_kind}' on '{source_id}' failed for event '{event}': {reason}")]
    GuardFailed {
        /// Guard discriminator (named guard kind or "predicate")
        guard_kind: String,
        /// Event that was being evaluated
        event: String,
        /// Id of the transition's source node
        source_id: String,
        /// Failure reason reported by the predicate
        reason: String,
    },

    /// A named delay has no entry in the machine options
    #[error("Delay '{0}' is not registered in machine options")]
    UnresolvedDelay(String),

    /// A named action has no implementation in the machine options
    #[error("Action '{0}' has no registered implementation")]
    UnknownActionRef(String),

    /// A named guard has no implementation in the machine options
    #[error("Guard '{0}' has no registered implementation")]
    UnknownGuardRef(String),

    /// An invoked service has no implementation in the machine options
    #[error("Service '{0}' has no registered implementation")]
    UnknownServiceRef(String),

    /// The reserved wildcard was used as an event name
    #[error("'{0}' is reserved and cannot be sent as an event")]
    ReservedEvent(String),
}

/// Errors raised while building a machine definition; always fatal
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// A compound state's `initial` names a nonexistent child
    #[error("Initial state '{initial}' of '{state_id}' does not exist")]
    InvalidInitial {
        /// Id of the compound state
        state_id: String,
        /// Declared initial key
        initial: String,
    },

    /// A transition target cannot be resolved inside the machine
    #[error("Transition target '{target}' on '{source_id}' cannot be resolved")]
    InvalidTarget {
        /// Id of the transition's source node
        source_id: String,
        /// Target expression as written
        target: String,
    },

    /// Two nodes declare the same id
    #[error("Duplicate state id '{0}'")]
    DuplicateId(String),

    /// The machine configuration is structurally malformed
    #[error("Invalid machine config: {0}")]
    InvalidConfig(String),
}

/// Result type using MachineError
pub type Result<T> = std::result::Result<T, MachineError>;
