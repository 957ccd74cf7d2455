//! Property-based tests for the universal step-engine invariants
//!
//! These drive a machine with nested, parallel and history states through
//! arbitrary event sequences and check that every reachable state satisfies
//! the configuration closure invariants, that stepping is deterministic,
//! and that unhandled events are fixed points.

use proptest::prelude::*;
use serde_json::json;
use stave::machine::configuration::{satisfies_invariants, Configuration};
use stave::machine::{
    Action, Guard, HistoryKind, MachineConfig, StateConfig, TransitionConfig,
};
use stave::{Machine, StateValue};

const EVENTS: &[&str] = &[
    "SPLIT", "MERGE", "GO", "STOP", "TOGGLE", "REFUEL", "RESET", "UP", "NOPE",
];

fn rover() -> Machine {
    Machine::new(
        MachineConfig::new("rover")
            .initial("ops")
            .context(json!({ "fuel": 2 }))
            .state(
                StateConfig::new("ops")
                    .initial("single")
                    .state(
                        StateConfig::new("single")
                            .on("SPLIT", vec![TransitionConfig::target("dual")])
                            .on(
                                "REFUEL",
                                vec![TransitionConfig::none().action(Action::assign(
                                    |ctx, _| {
                                        json!({ "fuel": ctx["fuel"].as_i64().unwrap() + 1 })
                                    },
                                ))],
                            ),
                    )
                    .state(
                        StateConfig::parallel("dual")
                            .state(
                                StateConfig::new("nav")
                                    .initial("idle")
                                    .state(
                                        StateConfig::new("idle").on(
                                            "GO",
                                            vec![TransitionConfig::target("moving")
                                                .guard(Guard::predicate(|ctx, _| {
                                                    ctx["fuel"].as_i64().unwrap() > 0
                                                }))
                                                .action(Action::assign(|ctx, _| {
                                                    json!({
                                                        "fuel":
                                                            ctx["fuel"].as_i64().unwrap() - 1
                                                    })
                                                }))],
                                        ),
                                    )
                                    .state(
                                        StateConfig::new("moving")
                                            .on("STOP", vec![TransitionConfig::target("idle")]),
                                    ),
                            )
                            .state(
                                StateConfig::new("radio")
                                    .initial("quiet")
                                    .state(
                                        StateConfig::new("quiet")
                                            .on("TOGGLE", vec![TransitionConfig::target("loud")]),
                                    )
                                    .state(
                                        StateConfig::new("loud")
                                            .on("TOGGLE", vec![TransitionConfig::target("quiet")]),
                                    ),
                            )
                            .on("MERGE", vec![TransitionConfig::target("single")]),
                    )
                    .state(StateConfig::history("hist", HistoryKind::Shallow))
                    .on("RESET", vec![TransitionConfig::target("#rover.down")]),
            )
            .state(
                StateConfig::new("down")
                    .id("rover.down")
                    .on("UP", vec![TransitionConfig::target("#rover.ops.hist")]),
            ),
    )
    .unwrap()
}

fn run(machine: &Machine, events: &[&str]) -> stave::State {
    let mut state = machine.initial_state().unwrap();
    for event in events {
        state = machine.transition(&state, *event).unwrap();
    }
    state
}

proptest! {
    #[test]
    fn every_reachable_configuration_is_closed(
        events in prop::collection::vec(prop::sample::select(EVENTS), 0..12)
    ) {
        let machine = rover();
        let mut state = machine.initial_state().unwrap();
        for event in &events {
            state = machine.transition(&state, *event).unwrap();
            let cfg = Configuration::from_nodes(state.configuration.iter().copied());
            prop_assert!(satisfies_invariants(machine.definition(), &cfg));
        }
    }

    #[test]
    fn stepping_is_deterministic(
        events in prop::collection::vec(prop::sample::select(EVENTS), 0..12)
    ) {
        let machine = rover();
        let a = run(&machine, &events);
        let b = run(&machine, &events);
        prop_assert_eq!(&a.value, &b.value);
        prop_assert_eq!(&a.context, &b.context);
        prop_assert_eq!(a.changed, b.changed);
    }

    #[test]
    fn unhandled_events_are_fixed_points(
        events in prop::collection::vec(prop::sample::select(EVENTS), 0..8)
    ) {
        let machine = rover();
        let state = run(&machine, &events);

        let next = machine.transition(&state, "NOPE").unwrap();
        prop_assert_eq!(&next.value, &state.value);
        prop_assert_eq!(&next.context, &state.context);
        prop_assert_eq!(next.changed, Some(false));
    }

    #[test]
    fn states_match_their_own_values(
        events in prop::collection::vec(prop::sample::select(EVENTS), 0..12)
    ) {
        let machine = rover();
        let state = run(&machine, &events);
        prop_assert!(state.matches(&state.value.clone()));

        for path in state.to_strings(".") {
            prop_assert!(state.matches(&StateValue::parse(&path, ".")));
        }
    }
}
