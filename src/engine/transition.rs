//! Pure step rules for transition chains
//!
//! These functions decide what happens after a handler returns. They do no
//! I/O, so the chain driver in the parent module stays a thin loop around
//! them.

use crate::config::SameStatePolicy;
use crate::state::StateId;
use thiserror::Error;

/// What the engine does next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Remain in the current state, chain ends
    Stay,
    /// Persist this state and run its `on_enter`
    Enter(StateId),
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Transition loop: more than {limit} enter steps in one cycle ({})", render_path(.path))]
    Loop { limit: usize, path: Vec<StateId> },
}

fn render_path(path: &[StateId]) -> String {
    path.iter()
        .map(StateId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Resolve the result of `on_response` for the session's current state
pub fn after_response(
    current: &StateId,
    returned: Option<StateId>,
    policy: SameStatePolicy,
) -> Step {
    match returned {
        None => Step::Stay,
        Some(next) if next == *current => match policy {
            SameStatePolicy::Stay => Step::Stay,
            SameStatePolicy::Reenter => Step::Enter(next),
        },
        Some(next) => Step::Enter(next),
    }
}

/// Resolve the result of `on_enter` for the state just entered.
///
/// Returning the same state is a fixed point, never a self-loop.
pub fn after_enter(entered: &StateId, returned: Option<StateId>) -> Step {
    match returned {
        Some(next) if next != *entered => Step::Enter(next),
        _ => Step::Stay,
    }
}

/// Counts `on_enter` invocations within one cycle
#[derive(Debug, Clone)]
pub struct ChainBudget {
    limit: usize,
    path: Vec<StateId>,
}

impl ChainBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            path: Vec::new(),
        }
    }

    /// Record an upcoming `on_enter` for `state`, failing once the limit is spent
    pub fn enter(&mut self, state: &StateId) -> Result<(), TransitionError> {
        self.path.push(state.clone());
        if self.path.len() > self.limit {
            return Err(TransitionError::Loop {
                limit: self.limit,
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Number of `on_enter` steps admitted so far
    pub fn steps(&self) -> usize {
        self.path.len().min(self.limit)
    }

    pub fn path(&self) -> &[StateId] {
        &self.path
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
