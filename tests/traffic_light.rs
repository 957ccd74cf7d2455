//! Traffic light end-to-end: flat transitions, changed flags, no-op events

use stave::machine::{MachineConfig, StateConfig, TransitionConfig};
use stave::{Machine, StateValue};

fn light() -> Machine {
    Machine::new(
        MachineConfig::new("light")
            .initial("green")
            .state(
                StateConfig::new("green").on("TIMER", vec![TransitionConfig::target("yellow")]),
            )
            .state(
                StateConfig::new("yellow").on("TIMER", vec![TransitionConfig::target("red")]),
            )
            .state(StateConfig::new("red").on("TIMER", vec![TransitionConfig::target("green")])),
    )
    .unwrap()
}

#[test]
fn initial_state_is_green() {
    let machine = light();
    let state = machine.initial_state().unwrap();

    assert_eq!(state.value, StateValue::leaf("green"));
    assert_eq!(state.event.name, "xstate.init");
    assert_eq!(state.changed, None);
}

#[test]
fn timer_cycles_through_all_lights() {
    let machine = light();
    let mut state = machine.initial_state().unwrap();

    let expected = ["yellow", "red", "green"];
    for key in expected {
        state = machine.transition(&state, "TIMER").unwrap();
        assert_eq!(state.value, StateValue::leaf(key));
        assert_eq!(state.changed, Some(true));
        assert_eq!(state.event.name, "TIMER");
    }
}

#[test]
fn unhandled_event_is_a_fixed_point() {
    let machine = light();
    let state = machine.initial_state().unwrap();

    let next = machine.transition(&state, "HONK").unwrap();
    assert_eq!(next.value, state.value);
    assert_eq!(next.context, state.context);
    assert_eq!(next.changed, Some(false));
    assert!(next.actions.is_empty());
}

#[test]
fn transition_is_deterministic() {
    let machine = light();
    let state = machine.initial_state().unwrap();

    let a = machine.transition(&state, "TIMER").unwrap();
    let b = machine.transition(&state, "TIMER").unwrap();
    assert_eq!(a.value, b.value);
    assert_eq!(a.context, b.context);
    assert_eq!(a.changed, b.changed);
}

#[test]
fn prev_state_chain_is_capped() {
    let machine = light();
    let s0 = machine.initial_state().unwrap();
    let s1 = machine.transition(&s0, "TIMER").unwrap();
    let s2 = machine.transition(&s1, "TIMER").unwrap();

    let prev = s2.prev_state.as_deref().unwrap();
    assert_eq!(prev.value, StateValue::leaf("yellow"));
    assert!(prev.prev_state.is_none());
}

#[test]
fn next_events_lists_handled_names() {
    let machine = light();
    let state = machine.initial_state().unwrap();
    assert_eq!(state.next_events(), vec!["TIMER".to_string()]);
}
