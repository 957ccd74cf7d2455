//! Event wrapping, built-in event names and pattern matching
//!
//! External callers send a bare name or a `(name, payload)` pair; the core
//! wraps both into an [`Event`] carrying metadata before stepping.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// The null (eventless) event name
pub const NULL_EVENT: &str = "";

/// The reserved wildcard pattern
pub const WILDCARD: &str = "*";

/// Event delivered when a machine computes its initial state
pub const INIT_EVENT: &str = "xstate.init";

/// Build the synthesized event name for a delayed transition
///
/// The delay is rendered as written in the definition: a literal
/// millisecond count or a named delay resolved later through options.
pub fn after_event_name(delay: &str, node_id: &str) -> String {
    format!("xstate.after({delay})#{node_id}")
}

/// Build the done-event name raised when a compound or parallel node
/// reaches a final configuration
pub fn done_state_event_name(node_id: &str) -> String {
    format!("done.state.{node_id}")
}

/// Check whether an event name belongs to the built-in namespace
///
/// Built-in events bypass the strict-mode declared-event check.
pub fn is_builtin_event(name: &str) -> bool {
    name.is_empty()
        || name.starts_with("xstate.")
        || name.starts_with("done.state.")
        || name.starts_with("done.invoke.")
        || name.starts_with("error.platform.")
}

/// An event wrapped with metadata, as seen by selectors and actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name ("type" in external records)
    pub name: String,

    /// Event payload
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    /// Originating node or actor id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Session the event belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

impl Event {
    /// Create an event with no payload
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Value::Null,
            origin: None,
            session_id: None,
        }
    }

    /// Create an event carrying a payload
    pub fn with_payload(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            origin: None,
            session_id: None,
        }
    }

    /// The null event used to take transient (eventless) transitions
    pub fn null() -> Self {
        Self::new(NULL_EVENT)
    }

    /// The built-in initialization event
    pub fn init() -> Self {
        Self::new(INIT_EVENT)
    }

    /// Attach an origin id
    pub fn from_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attach a fresh session id
    pub fn with_session(mut self) -> Self {
        self.session_id = Some(Uuid::new_v4());
        self
    }

    /// Whether this is the null event
    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "<null>")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::new(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::new(name)
    }
}

impl From<(&str, Value)> for Event {
    fn from((name, data): (&str, Value)) -> Self {
        Event::with_payload(name, data)
    }
}

impl From<(String, Value)> for Event {
    fn from((name, data): (String, Value)) -> Self {
        Event::with_payload(name, data)
    }
}

/// Transition event pattern: concrete name, null (eventless) or wildcard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPattern {
    /// Matches only the null event; taken immediately on entry
    Null,
    /// Matches every event except the null event
    Wildcard,
    /// Matches exactly one event name
    Exact(String),
}

impl EventPattern {
    /// Parse a pattern as written in a machine definition
    pub fn parse(spec: &str) -> Self {
        match spec {
            NULL_EVENT => EventPattern::Null,
            WILDCARD => EventPattern::Wildcard,
            name => EventPattern::Exact(name.to_string()),
        }
    }

    /// Test the pattern against an event name
    ///
    /// The wildcard never matches the null event; the null event matches
    /// only the null pattern.
    pub fn matches(&self, event_name: &str) -> bool {
        match self {
            EventPattern::Null => event_name.is_empty(),
            EventPattern::Wildcard => !event_name.is_empty(),
            EventPattern::Exact(name) => name == event_name,
        }
    }

    /// Render the pattern as written
    pub fn as_str(&self) -> &str {
        match self {
            EventPattern::Null => NULL_EVENT,
            EventPattern::Wildcard => WILDCARD,
            EventPattern::Exact(name) => name,
        }
    }
}
