//! Database module for statebot
//!
//! Provides persistence for per-user conversation sessions.

mod schema;

pub use schema::*;

use crate::runtime::traits::{NewUser, UserId, UserRecord};
use crate::state::INITIAL_STATE;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("User not found: {0}")]
    UserNotFound(UserId),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(MIGRATION_FILL_STATE_DATA)?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Get a user by transport identity
    pub fn get_user(&self, user_id: UserId) -> DbResult<Option<UserRecord>> {
        let conn = self.conn();
        select_user(&conn, user_id)
    }

    /// Insert a user or update an existing one.
    ///
    /// The chat id is always refreshed; `state` and `state_data` are only
    /// written when given.
    pub fn upsert_user(&self, user: &NewUser) -> DbResult<UserRecord> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (user_id, chat_id, state, state_data, created_at, updated_at)
             VALUES (?1, ?2, COALESCE(?3, ?5), COALESCE(?4, '{}'), ?6, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                chat_id = excluded.chat_id,
                state = COALESCE(?3, users.state),
                state_data = COALESCE(?4, users.state_data),
                updated_at = excluded.updated_at",
            params![
                user.user_id,
                user.chat_id,
                user.state,
                user.state_data,
                INITIAL_STATE,
                now
            ],
        )?;

        select_user(&conn, user.user_id)?.ok_or(DbError::UserNotFound(user.user_id))
    }

    /// Update state and optionally state data in a single statement
    pub fn update_user_state(
        &self,
        user_id: UserId,
        state: &str,
        state_data: Option<&str>,
    ) -> DbResult<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let updated = conn.execute(
            "UPDATE users SET state = ?1, state_data = COALESCE(?2, state_data), updated_at = ?3
             WHERE user_id = ?4",
            params![state, state_data, now, user_id],
        )?;

        if updated == 0 {
            return Err(DbError::UserNotFound(user_id));
        }
        Ok(())
    }

    /// Number of users currently in `state`
    pub fn count_users_in_state(&self, state: &str) -> DbResult<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM users WHERE state = ?1",
            params![state],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }

    /// Put every user back into the initial state with empty data
    pub fn reset_all_to_idle(&self) -> DbResult<usize> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE users SET state = ?1, state_data = '{}', updated_at = ?2
             WHERE state != ?1 OR state_data != '{}'",
            params![INITIAL_STATE, now],
        )?;
        Ok(updated)
    }
}

fn select_user(conn: &Connection, user_id: UserId) -> DbResult<Option<UserRecord>> {
    conn.query_row(
        "SELECT id, user_id, chat_id, state, state_data FROM users WHERE user_id = ?1",
        params![user_id],
        parse_user_row,
    )
    .optional()
    .map_err(DbError::from)
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        chat_id: row.get(2)?,
        state: row.get(3)?,
        state_data: row.get(4)?,
    })
}
