//! Database schema

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE,
    chat_id INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'idle',
    state_data TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_state ON users(state);
";

/// Blank state data written by external tools becomes an empty object
pub const MIGRATION_FILL_STATE_DATA: &str = r"
UPDATE users SET state_data = '{}' WHERE state_data IS NULL OR state_data = '';
";
