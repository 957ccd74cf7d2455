//! Action variants emitted by transitions, entries and exits
//!
//! Actions are tagged variants dispatched by match. Assign and pure actions
//! carry closures evaluated inside the core; everything else is emitted for
//! the surrounding interpreter loop to execute.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::event::Event;
use super::Context;

/// Side-effecting implementation of a custom action, executed by the
/// external interpreter loop
pub type ActionFn = Arc<dyn Fn(&Context, &Event) + Send + Sync>;

/// Pure context update: `(context, event) -> context`
pub type AssignFn = Arc<dyn Fn(&Context, &Event) -> Context + Send + Sync>;

/// Pure action computation: returns the actions to splice in place
pub type PureFn = Arc<dyn Fn(&Context, &Event) -> Vec<Action> + Send + Sync>;

/// Message expression for log actions
pub type LogFn = Arc<dyn Fn(&Context, &Event) -> String + Send + Sync>;

/// Delay attached to a send action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    /// Fixed delay in milliseconds
    Millis(u64),
    /// Named delay resolved through machine options
    Named(String),
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Millis(ms) => write!(f, "{ms}"),
            Delay::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Destination of a send action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendTarget {
    /// The machine itself; undelayed internal sends join the internal queue
    Internal,
    /// A named external actor or service
    External(String),
}

/// A send action: an event, an optional delay and a cancellation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendAction {
    /// Event to deliver
    pub event: Event,
    /// Delay before delivery, if any
    pub delay: Option<Delay>,
    /// Send id used by `Cancel` actions
    pub id: String,
    /// Delivery target
    pub to: SendTarget,
}

/// Tagged action variant
#[derive(Clone)]
pub enum Action {
    /// Send an event, possibly delayed, possibly to an external target
    Send(SendAction),
    /// Raise an event onto the internal queue
    Raise(Event),
    /// Emit a log line; the message closure runs against `(context, event)`
    Log {
        /// Optional label distinguishing log sources
        label: Option<String>,
        /// Message expression; label-only log actions omit it
        message: Option<LogFn>,
    },
    /// Pure context update, folded into the next context and never emitted
    Assign(AssignFn),
    /// Start an activity
    Start(String),
    /// Stop an activity or invoked service
    Stop(String),
    /// Invoke a service registered under `src`
    Invoke {
        /// Invocation id, unique within the machine
        id: String,
        /// Service name resolved through machine options
        src: String,
    },
    /// Cancel a previously scheduled delayed send
    Cancel(String),
    /// Computes a list of actions spliced in place (not expanded recursively)
    Pure(PureFn),
    /// User-defined action dispatched by kind
    Custom {
        /// Action kind, used to look up an implementation in options
        kind: String,
        /// Implementation, attached at resolution time when registered
        exec: Option<ActionFn>,
        /// Static parameters carried alongside the action
        params: Value,
    },
}

impl Action {
    /// Send an event to the machine itself
    pub fn send(event: impl Into<Event>) -> Self {
        let event = event.into();
        let id = event.name.clone();
        Action::Send(SendAction {
            event,
            delay: None,
            id,
            to: SendTarget::Internal,
        })
    }

    /// Send an event to the machine itself after a delay
    pub fn send_after(event: impl Into<Event>, delay: Delay) -> Self {
        let event = event.into();
        let id = event.name.clone();
        Action::Send(SendAction {
            event,
            delay: Some(delay),
            id,
            to: SendTarget::Internal,
        })
    }

    /// Raise an event onto the internal queue
    pub fn raise(event: impl Into<Event>) -> Self {
        Action::Raise(event.into())
    }

    /// Emit a labelled log line with a message expression
    pub fn log<F>(label: impl Into<String>, message: F) -> Self
    where
        F: Fn(&Context, &Event) -> String + Send + Sync + 'static,
    {
        Action::Log {
            label: Some(label.into()),
            message: Some(Arc::new(message)),
        }
    }

    /// Pure context update from `(context, event)`
    pub fn assign<F>(update: F) -> Self
    where
        F: Fn(&Context, &Event) -> Context + Send + Sync + 'static,
    {
        Action::Assign(Arc::new(update))
    }

    /// Compute a list of actions to splice in place
    pub fn pure<F>(compute: F) -> Self
    where
        F: Fn(&Context, &Event) -> Vec<Action> + Send + Sync + 'static,
    {
        Action::Pure(Arc::new(compute))
    }

    /// Cancel a delayed send by id
    pub fn cancel(send_id: impl Into<String>) -> Self {
        Action::Cancel(send_id.into())
    }

    /// Named action resolved through machine options
    pub fn named(kind: impl Into<String>) -> Self {
        Action::Custom {
            kind: kind.into(),
            exec: None,
            params: Value::Null,
        }
    }

    /// Named action with static parameters
    pub fn named_with(kind: impl Into<String>, params: Value) -> Self {
        Action::Custom {
            kind: kind.into(),
            exec: None,
            params,
        }
    }

    /// Serializable descriptor of this action, closures elided
    pub fn descriptor(&self) -> ActionDescriptor {
        match self {
            Action::Send(send) => ActionDescriptor::Send {
                event: send.event.name.clone(),
                delay: send.delay.as_ref().map(|d| d.to_string()),
                id: send.id.clone(),
            },
            Action::Raise(event) => ActionDescriptor::Raise {
                event: event.name.clone(),
            },
            Action::Log { label, .. } => ActionDescriptor::Log {
                label: label.clone(),
            },
            Action::Assign(_) => ActionDescriptor::Assign,
            Action::Start(activity) => ActionDescriptor::Start {
                activity: activity.clone(),
            },
            Action::Stop(activity) => ActionDescriptor::Stop {
                activity: activity.clone(),
            },
            Action::Invoke { id, src } => ActionDescriptor::Invoke {
                id: id.clone(),
                src: src.clone(),
            },
            Action::Cancel(send_id) => ActionDescriptor::Cancel {
                send_id: send_id.clone(),
            },
            Action::Pure(_) => ActionDescriptor::Pure,
            Action::Custom { kind, params, .. } => ActionDescriptor::Custom {
                kind: kind.clone(),
                params: params.clone(),
            },
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send(send) => f.debug_tuple("Send").field(send).finish(),
            Action::Raise(event) => f.debug_tuple("Raise").field(&event.name).finish(),
            Action::Log { label, .. } => f.debug_struct("Log").field("label", label).finish(),
            Action::Assign(_) => f.write_str("Assign(..)"),
            Action::Start(activity) => f.debug_tuple("Start").field(activity).finish(),
            Action::Stop(activity) => f.debug_tuple("Stop").field(activity).finish(),
            Action::Invoke { id, src } => f
                .debug_struct("Invoke")
                .field("id", id)
                .field("src", src)
                .finish(),
            Action::Cancel(send_id) => f.debug_tuple("Cancel").field(send_id).finish(),
            Action::Pure(_) => f.write_str("Pure(..)"),
            Action::Custom { kind, params, .. } => f
                .debug_struct("Custom")
                .field("kind", kind)
                .field("params", params)
                .finish(),
        }
    }
}

/// Serializable action descriptor for the persisted state format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDescriptor {
    /// Send descriptor with delay rendered as written
    Send {
        /// Event name
        event: String,
        /// Delay as written (millis or delay name)
        delay: Option<String>,
        /// Send id for cancellation
        id: String,
    },
    /// Raise descriptor
    Raise {
        /// Event name
        event: String,
    },
    /// Log descriptor
    Log {
        /// Log label
        label: Option<String>,
    },
    /// Assign marker; assigns never appear in emitted lists
    Assign,
    /// Activity start descriptor
    Start {
        /// Activity id
        activity: String,
    },
    /// Activity or service stop descriptor
    Stop {
        /// Activity or invocation id
        activity: String,
    },
    /// Service invocation descriptor
    Invoke {
        /// Invocation id
        id: String,
        /// Service name
        src: String,
    },
    /// Delayed-send cancellation descriptor
    Cancel {
        /// Send id being cancelled
        send_id: String,
    },
    /// Pure marker; unexpanded pure actions keep only their tag
    Pure,
    /// Custom action descriptor
    Custom {
        /// Action kind
        kind: String,
        /// Static parameters
        params: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_defaults_to_internal_with_name_as_id() {
        match Action::send("PING") {
            Action::Send(send) => {
                assert_eq!(send.event.name, "PING");
                assert_eq!(send.id, "PING");
                assert_eq!(send.to, SendTarget::Internal);
                assert!(send.delay.is_none());
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn descriptors_render_delays_as_written() {
        let fixed = Action::send_after("TICK", Delay::Millis(1000));
        assert_eq!(
            fixed.descriptor(),
            ActionDescriptor::Send {
                event: "TICK".into(),
                delay: Some("1000".into()),
                id: "TICK".into(),
            }
        );

        let named = Action::send_after("TICK", Delay::Named("SLOW".into()));
        match named.descriptor() {
            ActionDescriptor::Send { delay, .. } => assert_eq!(delay.as_deref(), Some("SLOW")),
            other => panic!("unexpected descriptor {other:?}"),
        }
    }
}
