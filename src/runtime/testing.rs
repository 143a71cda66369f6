//! Mock implementations for testing
//!
//! These mocks enable engine and dispatcher tests without real I/O.

use super::traits::{ChatId, NewUser, Transport, UserId, UserRecord, UserStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// Mock Transport
// ============================================================================

/// Transport that records every outbound message
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<(ChatId, String)>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    /// Delivered messages as `(chat_id, text)`
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivered texts only
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("mock transport is down".to_string());
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory user store for testing
#[derive(Default)]
pub struct InMemoryStorage {
    users: Mutex<HashMap<UserId, UserRecord>>,
    next_id: Mutex<i64>,
    state_writes: Mutex<usize>,
    fail_writes: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing the trait
    pub fn insert_record(&self, record: UserRecord) {
        {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id = (*next_id).max(record.id);
        }
        self.users.lock().unwrap().insert(record.user_id, record);
    }

    pub fn record(&self, user_id: UserId) -> Option<UserRecord> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }

    /// Successful `update_user_state` calls so far
    pub fn state_writes(&self) -> usize {
        *self.state_writes.lock().unwrap()
    }

    /// Make every write fail until switched back
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err("storage is read-only".to_string())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserStore for InMemoryStorage {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, String> {
        Ok(self.record(user_id))
    }

    async fn upsert_user(&self, user: &NewUser) -> Result<UserRecord, String> {
        self.check_writable()?;
        let mut users = self.users.lock().unwrap();
        let record = match users.get_mut(&user.user_id) {
            Some(existing) => {
                existing.chat_id = user.chat_id;
                if let Some(state) = &user.state {
                    existing.state.clone_from(state);
                }
                if let Some(data) = &user.state_data {
                    existing.state_data.clone_from(data);
                }
                existing.clone()
            }
            None => {
                let mut next_id = self.next_id.lock().unwrap();
                *next_id += 1;
                let record = UserRecord {
                    id: *next_id,
                    user_id: user.user_id,
                    chat_id: user.chat_id,
                    state: user.state.clone().unwrap_or_else(|| "idle".to_string()),
                    state_data: user.state_data.clone().unwrap_or_else(|| "{}".to_string()),
                };
                users.insert(user.user_id, record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn update_user_state(
        &self,
        user_id: UserId,
        state: &str,
        state_data: Option<&str>,
    ) -> Result<(), String> {
        self.check_writable()?;
        let mut users = self.users.lock().unwrap();
        let record = users
            .get_mut(&user_id)
            .ok_or_else(|| format!("User not found: {user_id}"))?;
        record.state = state.to_string();
        if let Some(data) = state_data {
            record.state_data = data.to_string();
        }
        *self.state_writes.lock().unwrap() += 1;
        Ok(())
    }
}
