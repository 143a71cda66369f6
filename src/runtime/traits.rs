//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the engine with mock implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable identifier the transport assigns to a user
pub type UserId = i64;

/// Where replies for a user are delivered
pub type ChatId = i64;

/// Durable user row as the storage collaborator returns it.
///
/// `state_data` is raw JSON text; the session layer parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub state: String,
    pub state_data: String,
}

/// Insert-or-update request. `None` fields keep the stored value
/// (or the column default for a new row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub state: Option<String>,
    pub state_data: Option<String>,
}

/// Storage for per-user sessions
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, String>;

    async fn upsert_user(&self, user: &NewUser) -> Result<UserRecord, String>;

    /// Update state and, when given, the serialized state data in one write
    async fn update_user_state(
        &self,
        user_id: UserId,
        state: &str,
        state_data: Option<&str>,
    ) -> Result<(), String>;
}

/// Outbound message delivery
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: UserStore + ?Sized> UserStore for Arc<T> {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, String> {
        (**self).get_user(user_id).await
    }

    async fn upsert_user(&self, user: &NewUser) -> Result<UserRecord, String> {
        (**self).upsert_user(user).await
    }

    async fn update_user_state(
        &self,
        user_id: UserId,
        state: &str,
        state_data: Option<&str>,
    ) -> Result<(), String> {
        (**self).update_user_state(user_id, state, state_data).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), String> {
        (**self).send(chat_id, text).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::Database;

/// Adapter to use Database as `UserStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn inner(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl UserStore for DatabaseStorage {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, String> {
        self.db.get_user(user_id).map_err(|e| e.to_string())
    }

    async fn upsert_user(&self, user: &NewUser) -> Result<UserRecord, String> {
        self.db.upsert_user(user).map_err(|e| e.to_string())
    }

    async fn update_user_state(
        &self,
        user_id: UserId,
        state: &str,
        state_data: Option<&str>,
    ) -> Result<(), String> {
        self.db
            .update_user_state(user_id, state, state_data)
            .map_err(|e| e.to_string())
    }
}
