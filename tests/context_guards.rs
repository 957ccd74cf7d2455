//! Extended state: assign actions, guard evaluation and strict mode

use serde_json::json;
use stave::machine::{
    Action, Guard, MachineConfig, MachineError, MachineOptions, StateConfig, TransitionConfig,
};
use stave::{Machine, StateValue};

fn counter() -> Machine {
    Machine::new(
        MachineConfig::new("counter")
            .initial("active")
            .context(json!({ "count": 0 }))
            .state(
                StateConfig::new("active")
                    .on(
                        "INC",
                        vec![TransitionConfig::none().action(Action::assign(|ctx, _| {
                            json!({ "count": ctx["count"].as_i64().unwrap() + 1 })
                        }))],
                    )
                    .on(
                        "DEC",
                        vec![TransitionConfig::none()
                            .guard(Guard::predicate(|ctx, _| {
                                ctx["count"].as_i64().unwrap() > 0
                            }))
                            .action(Action::assign(|ctx, _| {
                                json!({ "count": ctx["count"].as_i64().unwrap() - 1 })
                            }))],
                    )
                    .on(
                        "SET",
                        vec![TransitionConfig::none().action(Action::assign(|_, event| {
                            json!({ "count": event.data["to"] })
                        }))],
                    ),
            ),
    )
    .unwrap()
}

#[test]
fn assigns_accumulate_across_macrosteps() {
    let machine = counter();
    let mut state = machine.initial_state().unwrap();
    assert_eq!(state.context, json!({ "count": 0 }));

    for expected in 1..=3 {
        state = machine.transition(&state, "INC").unwrap();
        assert_eq!(state.context, json!({ "count": expected }));
        assert_eq!(state.changed, Some(true));
        assert_eq!(state.value, StateValue::leaf("active"));
    }
}

#[test]
fn assigns_see_the_event_payload() {
    let machine = counter();
    let state = machine.initial_state().unwrap();
    let next = machine
        .transition(&state, ("SET", json!({ "to": 42 })))
        .unwrap();
    assert_eq!(next.context, json!({ "count": 42 }));
}

#[test]
fn guard_blocks_transition_when_false() {
    let machine = counter();
    let state = machine.initial_state().unwrap();

    // count is 0, so DEC is disabled: no transition, nothing changed.
    let next = machine.transition(&state, "DEC").unwrap();
    assert_eq!(next.context, json!({ "count": 0 }));
    assert_eq!(next.changed, Some(false));

    let state = machine.transition(&state, "INC").unwrap();
    let next = machine.transition(&state, "DEC").unwrap();
    assert_eq!(next.context, json!({ "count": 0 }));
    assert_eq!(next.changed, Some(true));
}

#[test]
fn named_guards_resolve_through_options() {
    let build = |options: MachineOptions| {
        Machine::new(
            MachineConfig::new("m")
                .initial("idle")
                .context(json!({ "ready": true }))
                .state(
                    StateConfig::new("idle").on(
                        "START",
                        vec![TransitionConfig::target("running")
                            .guard(Guard::named("isReady"))],
                    ),
                )
                .state(StateConfig::new("running")),
        )
        .unwrap()
        .with_options(options)
    };

    let machine = build(MachineOptions::new().guard("isReady", |ctx, _| ctx["ready"] == true));
    let state = machine.initial_state().unwrap();
    let next = machine.transition(&state, "START").unwrap();
    assert_eq!(next.value, StateValue::leaf("running"));

    // Without an implementation the named guard is a hard error.
    let unbound = build(MachineOptions::new());
    let state = unbound.initial_state().unwrap();
    match unbound.transition(&state, "START") {
        Err(MachineError::UnknownGuardRef(name)) => assert_eq!(name, "isReady"),
        other => panic!("expected UnknownGuardRef, got {other:?}"),
    }
}

#[test]
fn failing_guard_surfaces_with_context_and_preserves_the_state() {
    let machine = Machine::new(
        MachineConfig::new("m")
            .initial("a")
            .state(
                StateConfig::new("a").on(
                    "GO",
                    vec![TransitionConfig::target("b").guard(Guard::try_predicate(
                        |_, _, _| Err("division by zero".to_string()),
                    ))],
                ),
            )
            .state(StateConfig::new("b")),
    )
    .unwrap();

    let state = machine.initial_state().unwrap();
    match machine.transition(&state, "GO") {
        Err(MachineError::GuardFailed {
            guard_kind,
            event,
            source_id,
            reason,
        }) => {
            assert_eq!(guard_kind, "predicate");
            assert_eq!(event, "GO");
            assert_eq!(source_id, "m.a");
            assert_eq!(reason, "division by zero");
        }
        other => panic!("expected GuardFailed, got {other:?}"),
    }
    // The caller still holds the original state, unadvanced.
    assert_eq!(state.value, StateValue::leaf("a"));
}

#[test]
fn in_state_predicate_gates_on_the_current_value() {
    let machine = Machine::new(
        MachineConfig::new("m")
            .initial("par")
            .state(
                StateConfig::parallel("par")
                    .state(
                        StateConfig::new("mode")
                            .initial("manual")
                            .state(StateConfig::new("manual"))
                            .state(StateConfig::new("auto"))
                            .on("TOGGLE", vec![TransitionConfig::target(".auto")]),
                    )
                    .state(
                        StateConfig::new("task")
                            .initial("idle")
                            .state(
                                StateConfig::new("idle").on(
                                    "RUN",
                                    vec![TransitionConfig::target("busy")
                                        .in_state("par.mode.auto")],
                                ),
                            )
                            .state(StateConfig::new("busy")),
                    ),
            ),
    )
    .unwrap();

    let state = machine.initial_state().unwrap();

    // In manual mode RUN is gated off.
    let blocked = machine.transition(&state, "RUN").unwrap();
    assert_eq!(blocked.changed, Some(false));

    let auto = machine.transition(&state, "TOGGLE").unwrap();
    let ran = machine.transition(&auto, "RUN").unwrap();
    assert!(ran.matches(&StateValue::parse("par.task.busy", ".")));
}

#[test]
fn strict_machines_reject_undeclared_events() {
    let machine = Machine::new(
        MachineConfig::new("m")
            .strict()
            .initial("a")
            .state(StateConfig::new("a").on("KNOWN", vec![TransitionConfig::target("b")]))
            .state(StateConfig::new("b")),
    )
    .unwrap();

    let state = machine.initial_state().unwrap();
    assert!(machine.transition(&state, "KNOWN").is_ok());

    match machine.transition(&state, "MYSTERY") {
        Err(MachineError::UnknownEvent { machine: id, event }) => {
            assert_eq!(id, "m");
            assert_eq!(event, "MYSTERY");
        }
        other => panic!("expected UnknownEvent, got {other:?}"),
    }

    // Built-in events always pass the strict check.
    assert!(machine.transition(&state, "xstate.init").is_ok());
}

#[test]
fn with_context_replaces_the_initial_context() {
    let machine = counter().with_context(json!({ "count": 40 }));
    let state = machine.initial_state().unwrap();
    let state = machine.transition(&state, "INC").unwrap();
    let state = machine.transition(&state, "INC").unwrap();
    assert_eq!(state.context, json!({ "count": 42 }));
}

#[test]
fn transition_with_context_overrides_the_recorded_context() {
    let machine = counter();
    let state = machine.initial_state().unwrap();

    let next = machine
        .transition_with_context(&state, "INC", json!({ "count": 99 }))
        .unwrap();
    assert_eq!(next.context, json!({ "count": 100 }));
}

#[test]
fn wildcard_event_name_cannot_be_sent() {
    let machine = counter();
    let state = machine.initial_state().unwrap();
    assert!(matches!(
        machine.transition(&state, "*"),
        Err(MachineError::ReservedEvent(_))
    ));
}
