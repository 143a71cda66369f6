//! Handler registry and fluent state builder
//!
//! Each state owns two independent handler slots, `on_enter` and
//! `on_response`. Registration never fails: the last handler written to a
//! slot wins and the other slot is left untouched.
//!
//! ```
//! use statebot::registry::{goto, stay, HandlerRegistry};
//!
//! let mut registry = HandlerRegistry::new();
//! registry
//!     .for_state("welcome")
//!     .on_enter(|ctx| async move {
//!         ctx.send("hi").await;
//!         stay()
//!     })
//!     .on_response(|_ctx, text| async move {
//!         if text == "go" { goto("menu") } else { stay() }
//!     });
//! assert!(registry.has_enter(&"welcome".into()));
//! ```

use crate::context::Context;
use crate::state::{StateId, StateKind};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by handler code for unexpected failures
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// `Ok(Some(state))` moves to `state`, `Ok(None)` stays put
pub type HandlerResult = Result<Option<StateId>, HandlerError>;

pub type EnterHandler = Arc<dyn Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

pub type ResponseHandler =
    Arc<dyn Fn(Context, String) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Remain in the current state
#[allow(clippy::unnecessary_wraps)]
pub fn stay() -> HandlerResult {
    Ok(None)
}

/// Move to `state`
#[allow(clippy::unnecessary_wraps)]
pub fn goto(state: impl Into<StateId>) -> HandlerResult {
    Ok(Some(state.into()))
}

/// The two handler slots of one state
#[derive(Clone, Default)]
pub struct HandlerPair {
    pub on_enter: Option<EnterHandler>,
    pub on_response: Option<ResponseHandler>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Handlers registered for states outside the declared set: {}", join_states(.0))]
    UnknownStates(Vec<StateId>),
}

fn join_states(states: &[StateId]) -> String {
    states
        .iter()
        .map(StateId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Mapping from state identifier to its handler pair
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<StateId, HandlerPair>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope a builder to one state or a list of states
    pub fn for_state(&mut self, states: impl IntoStateIds) -> StateBuilder<'_> {
        StateBuilder {
            registry: self,
            states: states.into_state_ids(),
        }
    }

    pub fn set_enter(&mut self, state: StateId, handler: EnterHandler) {
        self.handlers.entry(state).or_default().on_enter = Some(handler);
    }

    pub fn set_response(&mut self, state: StateId, handler: ResponseHandler) {
        self.handlers.entry(state).or_default().on_response = Some(handler);
    }

    pub fn enter_handler(&self, state: &StateId) -> Option<&EnterHandler> {
        self.handlers.get(state)?.on_enter.as_ref()
    }

    pub fn response_handler(&self, state: &StateId) -> Option<&ResponseHandler> {
        self.handlers.get(state)?.on_response.as_ref()
    }

    pub fn has_enter(&self, state: &StateId) -> bool {
        self.enter_handler(state).is_some()
    }

    pub fn has_response(&self, state: &StateId) -> bool {
        self.response_handler(state).is_some()
    }

    /// Every state with at least one handler, sorted
    pub fn states(&self) -> Vec<StateId> {
        let set: BTreeSet<&StateId> = self.handlers.keys().collect();
        set.into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Check that every registered state belongs to the closed set `K`.
    ///
    /// Meant to run once at startup, after all handlers are registered.
    pub fn validate<K: StateKind>(&self) -> Result<(), RegistryError> {
        let unknown: Vec<StateId> = self
            .states()
            .into_iter()
            .filter(|state| K::from_state_id(state).is_none())
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::UnknownStates(unknown))
        }
    }
}

/// Fluent registration scoped to one or more states
pub struct StateBuilder<'a> {
    registry: &'a mut HandlerRegistry,
    states: Vec<StateId>,
}

impl StateBuilder<'_> {
    /// Register the same enter handler under every state in scope
    #[allow(clippy::return_self_not_must_use)]
    pub fn on_enter<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: EnterHandler = Arc::new(move |ctx| handler(ctx).boxed());
        for state in &self.states {
            self.registry.set_enter(state.clone(), Arc::clone(&handler));
        }
        self
    }

    /// Register the same response handler under every state in scope
    #[allow(clippy::return_self_not_must_use)]
    pub fn on_response<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Context, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: ResponseHandler = Arc::new(move |ctx, text| handler(ctx, text).boxed());
        for state in &self.states {
            self.registry.set_response(state.clone(), Arc::clone(&handler));
        }
        self
    }

    /// States this builder registers into
    pub fn states(&self) -> &[StateId] {
        &self.states
    }
}

/// Anything `for_state` accepts: a single identifier or a list of them
pub trait IntoStateIds {
    fn into_state_ids(self) -> Vec<StateId>;
}

impl IntoStateIds for StateId {
    fn into_state_ids(self) -> Vec<StateId> {
        vec![self]
    }
}

impl IntoStateIds for &StateId {
    fn into_state_ids(self) -> Vec<StateId> {
        vec![self.clone()]
    }
}

impl IntoStateIds for &str {
    fn into_state_ids(self) -> Vec<StateId> {
        vec![StateId::from(self)]
    }
}

impl IntoStateIds for String {
    fn into_state_ids(self) -> Vec<StateId> {
        vec![StateId::from(self)]
    }
}

impl<T> IntoStateIds for Vec<T>
where
    T: Into<StateId>,
{
    fn into_state_ids(self) -> Vec<StateId> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T, const N: usize> IntoStateIds for [T; N]
where
    T: Into<StateId>,
{
    fn into_state_ids(self) -> Vec<StateId> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T> IntoStateIds for &[T]
where
    T: Clone + Into<StateId>,
{
    fn into_state_ids(self) -> Vec<StateId> {
        self.iter().cloned().map(Into::into).collect()
    }
}
