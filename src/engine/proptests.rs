//! Property-based tests for the transition step rules
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::{after_enter, after_response, ChainBudget, Step, TransitionError};
use crate::config::SameStatePolicy;
use crate::state::StateId;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = StateId> {
    prop_oneof![
        Just(StateId::initial()),
        "[a-z_]{1,12}".prop_map(StateId::from),
    ]
}

fn arb_policy() -> impl Strategy<Value = SameStatePolicy> {
    prop_oneof![Just(SameStatePolicy::Stay), Just(SameStatePolicy::Reenter)]
}

/// A successor table over a small alphabet so cycles are common
fn arb_graph() -> impl Strategy<Value = Vec<Option<usize>>> {
    (1usize..8).prop_flat_map(|n| proptest::collection::vec(proptest::option::of(0..n), n))
}

/// Walk `graph` from `start` using the engine's rules and budget
fn walk(graph: &[Option<usize>], start: usize, limit: usize) -> Result<Vec<usize>, TransitionError> {
    let ids: Vec<StateId> = (0..graph.len()).map(|i| StateId::from(format!("s{i}"))).collect();
    let mut budget = ChainBudget::new(limit);
    let mut visited = Vec::new();
    let mut current = start;

    loop {
        budget.enter(&ids[current])?;
        visited.push(current);
        let returned = graph[current].map(|i| ids[i].clone());
        match after_enter(&ids[current], returned) {
            Step::Stay => return Ok(visited),
            Step::Enter(next) => {
                current = ids.iter().position(|id| *id == next).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Returning nothing never moves the session
    #[test]
    fn prop_none_never_transitions(state in arb_state(), policy in arb_policy()) {
        prop_assert_eq!(after_response(&state, None, policy), Step::Stay);
        prop_assert_eq!(after_enter(&state, None), Step::Stay);
    }

    /// `on_enter` never re-enters the state it was invoked for
    #[test]
    fn prop_enter_has_no_self_loop(state in arb_state(), returned in proptest::option::of(arb_state())) {
        if let Step::Enter(next) = after_enter(&state, returned) {
            prop_assert_ne!(next, state);
        }
    }

    /// A different target from `on_response` is always entered, regardless of policy
    #[test]
    fn prop_response_enters_other_states(
        current in arb_state(),
        target in arb_state(),
        policy in arb_policy(),
    ) {
        let step = after_response(&current, Some(target.clone()), policy);
        if target == current {
            let expected = match policy {
                SameStatePolicy::Stay => Step::Stay,
                SameStatePolicy::Reenter => Step::Enter(current.clone()),
            };
            prop_assert_eq!(step, expected);
        } else {
            prop_assert_eq!(step, Step::Enter(target));
        }
    }

    /// Every chain either terminates within the budget or fails with a loop
    /// error after exactly `limit` admitted steps
    #[test]
    fn prop_chain_always_terminates(graph in arb_graph(), start_seed in any::<usize>(), limit in 1usize..30) {
        let start = start_seed % graph.len();
        match walk(&graph, start, limit) {
            Ok(visited) => {
                prop_assert!(visited.len() <= limit);
                let last = *visited.last().unwrap();
                // Chain stops on none or on a self-reference
                prop_assert!(graph[last].is_none() || graph[last] == Some(last));
            }
            Err(TransitionError::Loop { limit: reported, path }) => {
                prop_assert_eq!(reported, limit);
                prop_assert_eq!(path.len(), limit + 1);
            }
        }
    }

    /// A straight path is walked once, in order
    #[test]
    fn prop_acyclic_chain_visits_once(len in 1usize..10) {
        // s0 -> s1 -> ... -> s{len-1} -> none
        let graph: Vec<Option<usize>> = (0..len)
            .map(|i| if i + 1 < len { Some(i + 1) } else { None })
            .collect();
        let visited = walk(&graph, 0, 25).unwrap();
        prop_assert_eq!(visited, (0..len).collect::<Vec<_>>());
    }
}
