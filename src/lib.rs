//! Stave – a hierarchical statechart interpreter core
//!
//! This crate implements the Harel/SCXML family of statechart semantics:
//! - Nested (XOR compound) states and orthogonal (AND parallel) regions
//! - Shallow and deep history states, final states and done-events
//! - Guarded transitions with internal vs external semantics
//! - Delayed transitions desugared into send/cancel action pairs
//! - Raised internal events drained to run-to-completion quiescence
//! - Extended state ("context") mutated only through pure assign actions
//!
//! The core is single-threaded and fully synchronous: [`Machine::transition`]
//! is a pure function of `(state, event)` modulo user-supplied guard and
//! action closures. Timers, mailboxes and service transports belong to an
//! external interpreter loop; the core only emits the actions such a loop
//! would execute.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Statechart core modules implementing machine definition and stepping
pub mod machine;

// Re-export key types for convenience
pub use machine::{Machine, MachineConfig, MachineError, State, StateValue};

/// Current version of the Stave core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
