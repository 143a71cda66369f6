//! Transport binding
//!
//! Turns one inbound message into one full engine cycle: load or create the
//! session, run the cycle under the user's lock, and report failures back to
//! the user without ever crashing the caller.

use super::locks::UserLocks;
use super::traits::{ChatId, Transport, UserId, UserStore};
use crate::engine::{CycleOutcome, Engine, EngineError, Trigger};
use crate::session::{SessionError, SessionManager};
use crate::state::StateId;
use std::sync::Arc;
use uuid::Uuid;

/// A text message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub text: String,
}

impl Inbound {
    pub fn new(user_id: UserId, chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            text: text.into(),
        }
    }
}

pub struct Dispatcher<S: UserStore> {
    engine: Engine,
    sessions: SessionManager<S>,
    transport: Arc<dyn Transport>,
    locks: UserLocks,
}

impl<S: UserStore> Dispatcher<S> {
    pub fn new(engine: Engine, store: S, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine,
            sessions: SessionManager::new(store),
            transport,
            locks: UserLocks::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    /// Handle a message, logging and answering any failure.
    ///
    /// This is the entry point transports call. Errors never escape; the
    /// user gets the configured error reply instead.
    pub async fn dispatch(&self, inbound: &Inbound) -> Option<CycleOutcome> {
        let cycle_id = Uuid::new_v4();
        tracing::debug!(
            %cycle_id,
            user_id = inbound.user_id,
            chat_id = inbound.chat_id,
            "Inbound message"
        );

        let result = self.handle_message(inbound).await;
        self.locks.prune();

        match result {
            Ok(outcome) => {
                tracing::info!(
                    %cycle_id,
                    user_id = inbound.user_id,
                    from = %outcome.from,
                    to = %outcome.state,
                    entered = outcome.entered.len(),
                    writes = outcome.writes,
                    "Cycle complete"
                );
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(
                    %cycle_id,
                    user_id = inbound.user_id,
                    transition_loop = e.is_transition_loop(),
                    error = %e,
                    "Cycle failed"
                );
                self.send_error_reply(inbound.chat_id).await;
                None
            }
        }
    }

    /// Run one cycle for `inbound` and return its result unchanged.
    ///
    /// A user seen for the first time has the initial state entered instead
    /// of receiving `on_response` for a state they were never prompted in.
    pub async fn handle_message(&self, inbound: &Inbound) -> Result<CycleOutcome, EngineError> {
        let _guard = self.locks.lock(inbound.user_id).await;

        let (mut session, is_new) = self
            .sessions
            .get_or_create(inbound.user_id, inbound.chat_id)
            .await?;

        let trigger = if is_new {
            Trigger::Enter(session.state().clone())
        } else {
            Trigger::Message(inbound.text.clone())
        };

        let mut outcome = self
            .engine
            .run_cycle(&self.sessions, &mut session, self.transport.clone(), trigger)
            .await?;
        outcome.new_session = is_new;
        Ok(outcome)
    }

    /// Move a user to `to` from outside any handler and run its `on_enter`
    /// chain, as if a handler had returned it.
    pub async fn force_transition(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        to: impl Into<StateId>,
    ) -> Result<CycleOutcome, EngineError> {
        let to = to.into();
        let _guard = self.locks.lock(user_id).await;

        let (mut session, is_new) = self.sessions.get_or_create(user_id, chat_id).await?;
        tracing::info!(user_id, from = %session.state(), to = %to, "Forced transition");

        let mut outcome = self
            .engine
            .run_cycle(&self.sessions, &mut session, self.transport.clone(), Trigger::Enter(to))
            .await?;
        outcome.new_session = is_new;
        Ok(outcome)
    }

    /// Put a user back into the initial state with empty data.
    ///
    /// No handler runs; the next message is handled by the initial state's
    /// `on_response`.
    pub async fn reset(&self, user_id: UserId) -> Result<(), SessionError> {
        let _guard = self.locks.lock(user_id).await;
        self.sessions.reset(user_id).await
    }

    async fn send_error_reply(&self, chat_id: ChatId) {
        let Some(reply) = self.engine.config().error_reply.as_deref() else {
            return;
        };
        if let Err(e) = self.transport.send(chat_id, reply).await {
            tracing::warn!(chat_id, error = %e, "Failed to deliver error reply");
        }
    }
}
