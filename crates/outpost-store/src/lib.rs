//! Durable state for the Outpost HR bot.
//!
//! One SQLite database holds users, the tracked-user set, monitoring session
//! slots, per-(user, scenario) analytics counters and channel histograms, and
//! the score-ordered task queue. Writers that must move together (session
//! slot + tracked set + counter init, or the monolithic per-user deletes) run
//! inside a single transaction.

mod analytics;
mod sessions;
mod tasks;
mod users;

use std::path::Path;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use outpost_core::OutpostError;

pub use analytics::AnalyticsSnapshot;

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS users (
        user_id              TEXT PRIMARY KEY,
        current_display_name TEXT NOT NULL DEFAULT '',
        current_join_ts      INTEGER,
        previous_join_ts     INTEGER,
        recruitment_entry_ts INTEGER
    );
    CREATE TABLE IF NOT EXISTS tracked_users (
        user_id TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS sessions (
        user_id    TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        body       TEXT NOT NULL,
        PRIMARY KEY (user_id, started_at)
    );
    CREATE TABLE IF NOT EXISTS analytics (
        user_id  TEXT NOT NULL,
        scenario TEXT NOT NULL,
        field    TEXT NOT NULL,
        count    INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, scenario, field)
    );
    CREATE TABLE IF NOT EXISTS channel_counts (
        user_id    TEXT NOT NULL,
        scenario   TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        count      INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, scenario, channel_id)
    );
    CREATE TABLE IF NOT EXISTS tasks (
        task_id        TEXT PRIMARY KEY,
        scheduled_time INTEGER NOT NULL,
        body           TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_scheduled ON tasks(scheduled_time);
";

/// Handle to the bot's durable state.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Create or open the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OutpostError> {
        let conn = Connection::open(path.as_ref()).map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        info!(path = %path.as_ref().display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self, OutpostError> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

pub(crate) fn storage_err(e: rusqlite::Error) -> OutpostError {
    OutpostError::Storage(e.to_string())
}

pub(crate) fn json_err(e: serde_json::Error) -> OutpostError {
    OutpostError::Storage(e.to_string())
}
