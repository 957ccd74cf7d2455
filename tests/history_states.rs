//! Shallow and deep history: recording, restoration and default targets

use stave::machine::{HistoryKind, MachineConfig, StateConfig, TransitionConfig};
use stave::{Machine, StateValue};

fn player() -> Machine {
    Machine::new(
        MachineConfig::new("player")
            .initial("off")
            .state(
                StateConfig::new("off")
                    .on("POWER", vec![TransitionConfig::target("#player.on.hist")])
                    .on(
                        "POWER_DEEP",
                        vec![TransitionConfig::target("#player.on.memo")],
                    ),
            )
            .state(
                StateConfig::new("on")
                    .initial("playing")
                    .state(
                        StateConfig::new("playing")
                            .initial("track1")
                            .state(
                                StateConfig::new("track1")
                                    .on("NEXT", vec![TransitionConfig::target("track2")]),
                            )
                            .state(StateConfig::new("track2")),
                    )
                    .state(StateConfig::new("paused"))
                    .state(StateConfig::history("hist", HistoryKind::Shallow))
                    .state(StateConfig::history("memo", HistoryKind::Deep).target("paused"))
                    .on("PAUSE", vec![TransitionConfig::target("paused")])
                    .on("POWER_OFF", vec![TransitionConfig::target("off")]),
            ),
    )
    .unwrap()
}

fn on(value: StateValue) -> StateValue {
    StateValue::branch([("on", value)])
}

#[test]
fn unrecorded_shallow_history_enters_parent_initial() {
    let machine = player();
    let state = machine.initial_state().unwrap();

    let next = machine.transition(&state, "POWER").unwrap();
    assert_eq!(
        next.value,
        on(StateValue::branch([("playing", StateValue::leaf("track1"))]))
    );
}

#[test]
fn unrecorded_deep_history_uses_its_default_target() {
    let machine = player();
    let state = machine.initial_state().unwrap();

    let next = machine.transition(&state, "POWER_DEEP").unwrap();
    assert_eq!(next.value, on(StateValue::leaf("paused")));
}

#[test]
fn shallow_history_restores_child_and_reenters_its_initial() {
    let machine = player();
    let mut state = machine.initial_state().unwrap();
    for event in ["POWER", "NEXT", "POWER_OFF"] {
        state = machine.transition(&state, event).unwrap();
    }
    assert_eq!(state.value, StateValue::leaf("off"));

    // Shallow restores `playing` but its nested compound re-enters its own
    // initial track.
    let resumed = machine.transition(&state, "POWER").unwrap();
    assert_eq!(
        resumed.value,
        on(StateValue::branch([("playing", StateValue::leaf("track1"))]))
    );
}

#[test]
fn deep_history_restores_the_full_subtree() {
    let machine = player();
    let mut state = machine.initial_state().unwrap();
    for event in ["POWER", "NEXT", "POWER_OFF"] {
        state = machine.transition(&state, event).unwrap();
    }

    let resumed = machine.transition(&state, "POWER_DEEP").unwrap();
    assert_eq!(
        resumed.value,
        on(StateValue::branch([("playing", StateValue::leaf("track2"))]))
    );
}

#[test]
fn history_tracks_the_most_recent_exit() {
    let machine = player();
    let mut state = machine.initial_state().unwrap();
    for event in ["POWER", "PAUSE", "POWER_OFF"] {
        state = machine.transition(&state, event).unwrap();
    }

    // The last active child of `on` was `paused`.
    let resumed = machine.transition(&state, "POWER").unwrap();
    assert_eq!(resumed.value, on(StateValue::leaf("paused")));
}

#[test]
fn history_value_is_recorded_on_the_state() {
    let machine = player();
    let mut state = machine.initial_state().unwrap();
    for event in ["POWER", "NEXT", "POWER_OFF"] {
        state = machine.transition(&state, event).unwrap();
    }

    let hv = state.history_value.as_ref().unwrap();
    assert_eq!(
        hv.children["on"].current,
        StateValue::branch([("playing", StateValue::leaf("track2"))])
    );
}
