//! Context handed to state handlers
//!
//! A [`Context`] is a short-lived view: the engine builds a fresh one for
//! every step of a transition chain. All views of one inbound-message cycle
//! share the same [`StateData`] store, so data written in `on_response` is
//! visible to every `on_enter` that follows it.

use crate::runtime::traits::{ChatId, Transport, UserId};
use crate::state::StateId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Reserved key addressing the whole data map at once
pub const ALL_DATA_KEY: &str = "__all";

/// Working copy of a session's state data, shared across one cycle
#[derive(Clone, Default)]
pub struct StateData {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl StateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read one key. [`ALL_DATA_KEY`] returns the whole map as an object.
    pub fn get(&self, key: &str) -> Option<Value> {
        if key == ALL_DATA_KEY {
            return Some(Value::Object(self.snapshot()));
        }
        self.lock().get(key).cloned()
    }

    /// Write one key. Writing an object to [`ALL_DATA_KEY`] replaces the whole map.
    pub fn set(&self, key: &str, value: Value) {
        if key == ALL_DATA_KEY {
            match value {
                Value::Object(map) => self.restore(map),
                other => {
                    tracing::warn!(kind = %json_kind(&other), "Ignoring non-object bulk state data write");
                }
            }
            return;
        }
        self.lock().insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        if key == ALL_DATA_KEY {
            let old = std::mem::take(&mut *self.lock());
            return Some(Value::Object(old));
        }
        self.lock().remove(key)
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }

    /// Replace the contents wholesale
    pub fn restore(&self, map: Map<String, Value>) {
        *self.lock() = map;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Debug for StateData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateData").field(&*self.lock()).finish()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Per-step view exposed to handler code
#[derive(Clone)]
pub struct Context {
    user_id: UserId,
    chat_id: ChatId,
    current_state: StateId,
    data: StateData,
    transport: Arc<dyn Transport>,
    requested: Arc<Mutex<Option<StateId>>>,
}

impl Context {
    pub fn new(
        user_id: UserId,
        chat_id: ChatId,
        current_state: StateId,
        data: StateData,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            user_id,
            chat_id,
            current_state,
            data,
            transport,
            requested: Arc::new(Mutex::new(None)),
        }
    }

    /// Fresh view for the next chain step: same store and transport,
    /// new current state, no pending transition request.
    #[must_use]
    pub fn for_state(&self, state: StateId) -> Self {
        Self::new(
            self.user_id,
            self.chat_id,
            state,
            self.data.clone(),
            Arc::clone(&self.transport),
        )
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// State this view was built for
    pub fn current_state(&self) -> &StateId {
        &self.current_state
    }

    /// Send a text message to the user.
    ///
    /// Delivery failures are logged and reported as `false`; they never abort
    /// the state machine.
    pub async fn send(&self, text: impl AsRef<str>) -> bool {
        let text = text.as_ref();
        match self.transport.send(self.chat_id, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    user_id = self.user_id,
                    chat_id = self.chat_id,
                    state = %self.current_state,
                    error = %e,
                    "Failed to send message"
                );
                false
            }
        }
    }

    /// Read a typed value. Missing keys and type mismatches both yield `None`.
    pub fn get_data<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.data.get(key)?;
        serde_json::from_value(value).ok()
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.data.get(key)
    }

    pub fn set_data<T: Serialize>(&self, key: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.data.set(key, value);
        Ok(())
    }

    pub fn remove_data(&self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Shared working store behind this view
    pub fn data(&self) -> &StateData {
        &self.data
    }

    /// Ask the engine to move to `to` once the current handler returns.
    ///
    /// A state returned from the handler takes precedence over this request.
    /// The last call wins when invoked more than once.
    pub fn transition(&self, to: impl Into<StateId>) {
        let to = to.into();
        tracing::debug!(from = %self.current_state, to = %to, "Transition requested by handler");
        *self.requested.lock().unwrap_or_else(PoisonError::into_inner) = Some(to);
    }

    pub(crate) fn take_requested_transition(&self) -> Option<StateId> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("user_id", &self.user_id)
            .field("chat_id", &self.chat_id)
            .field("current_state", &self.current_state)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}
