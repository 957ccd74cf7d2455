//! Action resolution: turning a microstep into an ordered action list and
//! the next context
//!
//! The canonical order is exits (with activity stops), transition actions,
//! entries (with activity starts and invocations), then done-events.
//! Assigns fold into the context and never reach the emitted list; raises
//! and undelayed internal sends become internal events.

use serde_json::Value;
use std::collections::BTreeSet;

use super::action::{Action, Delay, SendAction, SendTarget};
use super::configuration::is_in_final_state;
use super::definition::Definition;
use super::error::{MachineError, Result};
use super::event::{done_state_event_name, Event};
use super::node::{InvokeDef, NodeKind};
use super::options::MachineOptions;
use super::selector::Microstep;
use super::Context;

/// Result of resolving one microstep
#[derive(Debug, Default)]
pub struct ResolvedStep {
    /// Emitted side-effect actions, in canonical order
    pub actions: Vec<Action>,
    /// Context after folding every assign
    pub context: Context,
    /// Events for the internal queue, in raise order
    pub raised: Vec<Event>,
    /// Whether any assign ran
    pub assigned: bool,
    /// Activities started by entered nodes or explicit actions
    pub started: Vec<String>,
    /// Activities or invocations stopped by exited nodes or explicit actions
    pub stopped: Vec<String>,
    /// Services invoked by entered nodes
    pub invoked: Vec<InvokeDef>,
}

/// Resolve the action list and next context for one microstep
///
/// Assigns are folded left-to-right: each sees the result of the previous
/// one, all against this microstep's event snapshot.
pub fn resolve_step(
    def: &Definition,
    options: &MachineOptions,
    micro: &Microstep,
    context: &Context,
    event: &Event,
) -> Result<ResolvedStep> {
    let mut raw: Vec<Action> = Vec::new();

    for &node in &micro.exit_set {
        let n = def.node(node);
        raw.extend(n.exit.iter().cloned());
        for activity in &n.activities {
            raw.push(Action::Stop(activity.clone()));
        }
        for invocation in &n.invocations {
            raw.push(Action::Stop(invocation.id.clone()));
        }
    }

    for transition in &micro.transitions {
        raw.extend(transition.actions.iter().cloned());
    }

    for &node in &micro.entry_set {
        let n = def.node(node);
        raw.extend(n.entry.iter().cloned());
        for activity in &n.activities {
            raw.push(Action::Start(activity.clone()));
        }
        for invocation in &n.invocations {
            raw.push(Action::Invoke {
                id: invocation.id.clone(),
                src: invocation.src.clone(),
            });
        }
    }

    // Done-events: entering a final node completes its parent; a parallel
    // grandparent completes once every region is in final.
    let mut done_raised: BTreeSet<String> = BTreeSet::new();
    for &node in &micro.entry_set {
        let n = def.node(node);
        if n.kind != NodeKind::Final {
            continue;
        }
        let parent = match n.parent {
            Some(parent) => parent,
            None => continue,
        };
        let parent_id = def.node(parent).id.clone();
        if done_raised.insert(parent_id.clone()) {
            let data = n.done_data.clone().unwrap_or(Value::Null);
            raw.push(Action::Raise(Event::with_payload(
                done_state_event_name(&parent_id),
                data,
            )));
        }
        if let Some(grandparent) = def.node(parent).parent {
            if def.node(grandparent).kind == NodeKind::Parallel
                && is_in_final_state(def, &micro.configuration, grandparent)
            {
                let grandparent_id = def.node(grandparent).id.clone();
                if done_raised.insert(grandparent_id.clone()) {
                    raw.push(Action::Raise(Event::new(done_state_event_name(
                        &grandparent_id,
                    ))));
                }
            }
        }
    }

    let mut resolved = ResolvedStep {
        context: context.clone(),
        ..Default::default()
    };
    for action in raw {
        apply_action(options, &mut resolved, action, event, true)?;
    }
    Ok(resolved)
}

fn apply_action(
    options: &MachineOptions,
    out: &mut ResolvedStep,
    action: Action,
    event: &Event,
    expand_pure: bool,
) -> Result<()> {
    match action {
        Action::Assign(update) => {
            out.context = update(&out.context, event);
            out.assigned = true;
        }
        Action::Pure(compute) if expand_pure => {
            // Expansion is not recursive: a pure action returned by a pure
            // action is emitted unexpanded.
            for inner in compute(&out.context, event) {
                apply_action(options, out, inner, event, false)?;
            }
        }
        Action::Pure(compute) => out.actions.push(Action::Pure(compute)),
        Action::Raise(raised) => out.raised.push(raised),
        Action::Send(send) => {
            if send.delay.is_none() && send.to == SendTarget::Internal {
                out.raised.push(send.event);
            } else {
                out.actions.push(Action::Send(resolve_delay(options, send)?));
            }
        }
        Action::Custom {
            kind,
            exec: None,
            params,
        } => {
            let exec = options
                .action_impl(&kind)
                .cloned()
                .ok_or_else(|| MachineError::UnknownActionRef(kind.clone()))?;
            out.actions.push(Action::Custom {
                kind,
                exec: Some(exec),
                params,
            });
        }
        Action::Custom { .. } => out.actions.push(action),
        Action::Invoke { id, src } => {
            if !options.has_service(&src) {
                return Err(MachineError::UnknownServiceRef(src));
            }
            out.invoked.push(InvokeDef {
                id: id.clone(),
                src: src.clone(),
            });
            out.actions.push(Action::Invoke { id, src });
        }
        Action::Start(id) => {
            out.started.push(id.clone());
            out.actions.push(Action::Start(id));
        }
        Action::Stop(id) => {
            out.stopped.push(id.clone());
            out.actions.push(Action::Stop(id));
        }
        Action::Log { .. } | Action::Cancel(_) => out.actions.push(action),
    }
    Ok(())
}

fn resolve_delay(options: &MachineOptions, send: SendAction) -> Result<SendAction> {
    let SendAction {
        event,
        delay,
        id,
        to,
    } = send;
    let delay = match delay {
        Some(Delay::Named(name)) => {
            let millis = options
                .delay_millis(&name)
                .ok_or(MachineError::UnresolvedDelay(name))?;
            Some(Delay::Millis(millis))
        }
        other => other,
    };
    Ok(SendAction {
        event,
        delay,
        id,
        to,
    })
}
