//! Execution engine
//!
//! Looks up and invokes state handlers, then drives chained `on_enter`
//! transitions until a fixed point. Each successful step that moves the
//! session is persisted before the next handler runs, so a failing handler
//! leaves the session in the last state that completed cleanly.

pub mod transition;

#[cfg(test)]
mod proptests;

pub use transition::{after_enter, after_response, ChainBudget, Step, TransitionError};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::registry::{HandlerError, HandlerRegistry, HandlerResult};
use crate::runtime::traits::{Transport, UserStore};
use crate::session::{Session, SessionError, SessionManager};
use crate::state::StateId;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Which handler slot was running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Enter,
    Response,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Enter => f.write_str("on_enter"),
            Phase::Response => f.write_str("on_response"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{phase} handler for state '{state}' failed: {source}")]
    Handler {
        state: StateId,
        phase: Phase,
        #[source]
        source: HandlerError,
    },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl EngineError {
    pub fn is_transition_loop(&self) -> bool {
        matches!(self, EngineError::Transition(TransitionError::Loop { .. }))
    }
}

/// What starts a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// An inbound text message for the session's current state
    Message(String),
    /// Move to this state (if not already there) and run its `on_enter` chain
    Enter(StateId),
}

/// Summary of one completed cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// State the session was in when the cycle started
    pub from: StateId,
    /// State the session ended in
    pub state: StateId,
    /// Every state whose `on_enter` ran, in order
    pub entered: Vec<StateId>,
    /// Number of storage writes performed
    pub writes: usize,
    /// Set by the dispatcher when the session was created for this message
    pub new_session: bool,
}

impl CycleOutcome {
    pub fn changed_state(&self) -> bool {
        self.from != self.state
    }
}

pub struct Engine {
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: impl Into<Arc<HandlerRegistry>>, config: EngineConfig) -> Self {
        Self {
            registry: registry.into(),
            config,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the response handler of `state`, if any.
    ///
    /// A transition requested through [`Context::transition`] is used when the
    /// handler itself returns nothing.
    pub async fn execute_on_response(&self, state: &StateId, ctx: &Context, text: &str) -> HandlerResult {
        let Some(handler) = self.registry.response_handler(state) else {
            tracing::trace!(state = %state, "No response handler");
            return Ok(None);
        };
        let returned = handler(ctx.clone(), text.to_string()).await?;
        Ok(returned.or_else(|| ctx.take_requested_transition()))
    }

    /// Run the enter handler of `state`, if any
    pub async fn execute_on_enter(&self, state: &StateId, ctx: &Context) -> HandlerResult {
        let Some(handler) = self.registry.enter_handler(state) else {
            tracing::trace!(state = %state, "No enter handler");
            return Ok(None);
        };
        let returned = handler(ctx.clone()).await?;
        Ok(returned.or_else(|| ctx.take_requested_transition()))
    }

    /// Drive one full cycle for `session` and reconcile it with storage.
    ///
    /// On error the session is rolled back to what storage holds, so data
    /// written by the failing handler is never persisted by a later
    /// [`SessionManager::reconcile`].
    pub async fn run_cycle<S: UserStore>(
        &self,
        sessions: &SessionManager<S>,
        session: &mut Session,
        transport: Arc<dyn Transport>,
        trigger: Trigger,
    ) -> Result<CycleOutcome, EngineError> {
        let result = self.drive(sessions, session, transport, trigger).await;
        if result.is_err() {
            session.rollback();
        }
        result
    }

    async fn drive<S: UserStore>(
        &self,
        sessions: &SessionManager<S>,
        session: &mut Session,
        transport: Arc<dyn Transport>,
        trigger: Trigger,
    ) -> Result<CycleOutcome, EngineError> {
        let from = session.state().clone();
        let base = Context::new(
            session.user_id(),
            session.chat_id(),
            from.clone(),
            session.data().clone(),
            transport,
        );
        let mut outcome = CycleOutcome {
            from: from.clone(),
            state: from.clone(),
            entered: Vec::new(),
            writes: 0,
            new_session: false,
        };

        let first = match trigger {
            Trigger::Message(text) => {
                let returned = self
                    .execute_on_response(&from, &base, &text)
                    .await
                    .map_err(|source| EngineError::Handler {
                        state: from.clone(),
                        phase: Phase::Response,
                        source,
                    })?;
                after_response(&from, returned, self.config.same_state)
            }
            Trigger::Enter(state) => Step::Enter(state),
        };

        if let Step::Enter(state) = first {
            tracing::debug!(user_id = session.user_id(), from = %from, to = %state, "Transition");
            session.set_state(state.clone());
            outcome.writes += usize::from(sessions.reconcile(session).await?);
            self.enter_chain(sessions, session, &base, state, &mut outcome)
                .await?;
        }

        outcome.writes += usize::from(sessions.reconcile(session).await?);
        outcome.state.clone_from(session.state());
        Ok(outcome)
    }

    /// Run `on_enter` for `state` and every state it leads to.
    ///
    /// The budget is charged before a target is persisted, so a refused
    /// target never reaches storage.
    async fn enter_chain<S: UserStore>(
        &self,
        sessions: &SessionManager<S>,
        session: &mut Session,
        base: &Context,
        mut state: StateId,
        outcome: &mut CycleOutcome,
    ) -> Result<(), EngineError> {
        let mut budget = ChainBudget::new(self.config.max_chain_length);
        self.charge(&mut budget, session, &state)?;

        loop {
            let view = base.for_state(state.clone());
            let returned = self
                .execute_on_enter(&state, &view)
                .await
                .map_err(|source| EngineError::Handler {
                    state: state.clone(),
                    phase: Phase::Enter,
                    source,
                })?;
            outcome.entered.push(state.clone());

            match after_enter(&state, returned) {
                Step::Stay => return Ok(()),
                Step::Enter(next) => {
                    self.charge(&mut budget, session, &next)?;
                    tracing::debug!(user_id = session.user_id(), from = %state, to = %next, "Chained transition");
                    session.set_state(next.clone());
                    outcome.writes += usize::from(sessions.reconcile(session).await?);
                    state = next;
                }
            }
        }
    }

    fn charge(
        &self,
        budget: &mut ChainBudget,
        session: &Session,
        state: &StateId,
    ) -> Result<(), EngineError> {
        budget.enter(state).map_err(|e| {
            tracing::error!(
                user_id = session.user_id(),
                limit = self.config.max_chain_length,
                error = %e,
                "Aborting transition chain"
            );
            EngineError::from(e)
        })
    }
}
