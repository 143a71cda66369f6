//! Session reconciliation
//!
//! A [`Session`] pairs the working copy a cycle mutates with the values last
//! written to storage. [`SessionManager::reconcile`] compares the two by
//! value and writes only when something changed.

use crate::context::StateData;
use crate::runtime::traits::{ChatId, NewUser, UserId, UserRecord, UserStore};
use crate::state::{StateId, INITIAL_STATE};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Failed to encode state data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-user conversation state for the duration of one cycle
#[derive(Debug)]
pub struct Session {
    record_id: i64,
    user_id: UserId,
    chat_id: ChatId,
    state: StateId,
    data: StateData,
    persisted_state: StateId,
    persisted_data: Map<String, Value>,
}

impl Session {
    fn from_record(record: UserRecord) -> Self {
        let data = parse_state_data(record.user_id, &record.state_data);
        let state = if record.state.is_empty() {
            StateId::initial()
        } else {
            StateId::from(record.state)
        };
        Self {
            record_id: record.id,
            user_id: record.user_id,
            chat_id: record.chat_id,
            persisted_state: state.clone(),
            state,
            data: StateData::from_map(data.clone()),
            persisted_data: data,
        }
    }

    pub fn record_id(&self) -> i64 {
        self.record_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Current (working) state
    pub fn state(&self) -> &StateId {
        &self.state
    }

    pub fn set_state(&mut self, state: StateId) {
        self.state = state;
    }

    /// Working data store; clones share it
    pub fn data(&self) -> &StateData {
        &self.data
    }

    /// State as of the last successful write
    pub fn persisted_state(&self) -> &StateId {
        &self.persisted_state
    }

    pub fn persisted_data(&self) -> &Map<String, Value> {
        &self.persisted_data
    }

    pub fn is_dirty(&self) -> bool {
        self.state != self.persisted_state || self.data.snapshot() != self.persisted_data
    }

    /// Discard unpersisted changes to state and data
    pub fn rollback(&mut self) {
        self.state.clone_from(&self.persisted_state);
        self.data.restore(self.persisted_data.clone());
    }
}

/// Parse stored state data. Anything that is not a JSON object becomes `{}`.
fn parse_state_data(user_id: UserId, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(user_id, value = %other, "Stored state data is not an object, resetting");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Stored state data is not valid JSON, resetting");
            Map::new()
        }
    }
}

/// Owns all reads and writes of durable sessions
pub struct SessionManager<S: UserStore> {
    store: S,
}

impl<S: UserStore> SessionManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the session for `user_id`, creating it in the initial state if
    /// this user was never seen. The flag reports whether it was created.
    pub async fn get_or_create(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<(Session, bool), SessionError> {
        if let Some(record) = self
            .store
            .get_user(user_id)
            .await
            .map_err(SessionError::Storage)?
        {
            let record = if record.chat_id == chat_id {
                record
            } else {
                tracing::debug!(user_id, old = record.chat_id, new = chat_id, "Chat handle changed");
                self.store
                    .upsert_user(&NewUser {
                        user_id,
                        chat_id,
                        state: None,
                        state_data: None,
                    })
                    .await
                    .map_err(SessionError::Storage)?
            };
            return Ok((Session::from_record(record), false));
        }

        let record = self
            .store
            .upsert_user(&NewUser {
                user_id,
                chat_id,
                state: Some(INITIAL_STATE.to_string()),
                state_data: Some("{}".to_string()),
            })
            .await
            .map_err(SessionError::Storage)?;

        tracing::info!(user_id, chat_id, "Created session for new user");
        Ok((Session::from_record(record), true))
    }

    /// Write state and data back if either differs from the last write.
    ///
    /// Returns whether a write happened.
    pub async fn reconcile(&self, session: &mut Session) -> Result<bool, SessionError> {
        let data = session.data.snapshot();
        let state_changed = session.state != session.persisted_state;
        let data_changed = data != session.persisted_data;

        if !state_changed && !data_changed {
            return Ok(false);
        }

        let encoded = serde_json::to_string(&data)?;
        self.store
            .update_user_state(session.user_id, session.state.as_str(), Some(&encoded))
            .await
            .map_err(SessionError::Storage)?;

        tracing::debug!(
            user_id = session.user_id,
            state = %session.state,
            state_changed,
            data_changed,
            "Session persisted"
        );

        session.persisted_state.clone_from(&session.state);
        session.persisted_data = data;
        Ok(true)
    }

    /// Put a user back to the initial state with empty data.
    ///
    /// The row is kept so the user's identity survives the reset.
    pub async fn reset(&self, user_id: UserId) -> Result<(), SessionError> {
        self.store
            .update_user_state(user_id, INITIAL_STATE, Some("{}"))
            .await
            .map_err(SessionError::Storage)?;
        tracing::info!(user_id, "Session reset to initial state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::InMemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn new_user_starts_idle_and_empty() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());

        let (session, is_new) = sessions.get_or_create(42, 420).await.unwrap();
        assert!(is_new);
        assert_eq!(session.state(), "idle");
        assert!(session.data().is_empty());
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn second_load_returns_persisted_state() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());

        let (mut session, _) = sessions.get_or_create(42, 420).await.unwrap();
        session.set_state(StateId::from("menu"));
        session.data().set("name", json!("Ada"));
        assert!(sessions.reconcile(&mut session).await.unwrap());

        let (again, is_new) = sessions.get_or_create(42, 420).await.unwrap();
        assert!(!is_new);
        assert_eq!(again.state(), "menu");
        assert_eq!(again.data().get("name"), Some(json!("Ada")));
    }

    #[tokio::test]
    async fn reconcile_skips_write_when_unchanged() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());
        let (mut session, _) = sessions.get_or_create(1, 1).await.unwrap();
        let before = storage.state_writes();

        assert!(!sessions.reconcile(&mut session).await.unwrap());

        // Same value written again is still no change
        session.data().set("k", json!(1));
        session.data().remove("k");
        assert!(!sessions.reconcile(&mut session).await.unwrap());
        assert_eq!(storage.state_writes(), before);
    }

    #[tokio::test]
    async fn reconcile_writes_data_only_changes() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());
        let (mut session, _) = sessions.get_or_create(1, 1).await.unwrap();

        session.data().set("step", json!(2));
        assert!(sessions.reconcile(&mut session).await.unwrap());
        assert_eq!(storage.state_writes(), 1);

        let record = storage.record(1).unwrap();
        assert_eq!(record.state, "idle");
        assert_eq!(record.state_data, r#"{"step":2}"#);
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn reset_keeps_row_and_clears_state() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());
        let (mut session, _) = sessions.get_or_create(5, 50).await.unwrap();
        session.set_state(StateId::from("checkout"));
        session.data().set("cart", json!([1, 2]));
        sessions.reconcile(&mut session).await.unwrap();

        sessions.reset(5).await.unwrap();

        let record = storage.record(5).unwrap();
        assert_eq!(record.id, session.record_id());
        assert_eq!(record.state, "idle");
        assert_eq!(record.state_data, "{}");

        let (_, is_new) = sessions.get_or_create(5, 50).await.unwrap();
        assert!(!is_new);
    }

    #[tokio::test]
    async fn corrupt_state_data_loads_as_empty() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.insert_record(UserRecord {
            id: 1,
            user_id: 9,
            chat_id: 90,
            state: "menu".to_string(),
            state_data: "{not json".to_string(),
        });
        storage.insert_record(UserRecord {
            id: 2,
            user_id: 10,
            chat_id: 100,
            state: "menu".to_string(),
            state_data: "[1,2,3]".to_string(),
        });
        let sessions = SessionManager::new(storage.clone());

        let (session, _) = sessions.get_or_create(9, 90).await.unwrap();
        assert_eq!(session.state(), "menu");
        assert!(session.data().is_empty());

        let (session, _) = sessions.get_or_create(10, 100).await.unwrap();
        assert!(session.data().is_empty());
    }

    #[tokio::test]
    async fn chat_handle_is_refreshed() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());
        let (mut session, _) = sessions.get_or_create(3, 30).await.unwrap();
        session.set_state(StateId::from("menu"));
        sessions.reconcile(&mut session).await.unwrap();

        let (moved, is_new) = sessions.get_or_create(3, 31).await.unwrap();
        assert!(!is_new);
        assert_eq!(moved.chat_id(), 31);
        assert_eq!(moved.state(), "menu");
        assert_eq!(storage.record(3).unwrap().chat_id, 31);
    }

    #[tokio::test]
    async fn storage_failure_surfaces() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());
        let (mut session, _) = sessions.get_or_create(1, 1).await.unwrap();

        storage.fail_writes(true);
        session.set_state(StateId::from("menu"));
        let err = sessions.reconcile(&mut session).await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert!(session.is_dirty(), "failed write must not mark the session clean");
    }

    #[tokio::test]
    async fn rollback_restores_last_persisted_values() {
        let storage = Arc::new(InMemoryStorage::new());
        let sessions = SessionManager::new(storage.clone());
        let (mut session, _) = sessions.get_or_create(1, 1).await.unwrap();
        session.set_state(StateId::from("menu"));
        session.data().set("kept", json!(1));
        sessions.reconcile(&mut session).await.unwrap();

        session.set_state(StateId::from("checkout"));
        session.data().set("draft", json!(true));
        session.rollback();

        assert_eq!(session.state(), "menu");
        assert_eq!(session.data().get("draft"), None);
        assert_eq!(session.data().get("kept"), Some(json!(1)));
        assert!(!session.is_dirty());
    }
}
