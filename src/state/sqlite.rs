//! SQLite-backed state store.
//!
//! One row per source instance; the state is stored as a JSON document and
//! replaced with a single upsert, which SQLite applies atomically.

use super::{StateStore, StoredState};
use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Persists source state in SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE source_state (
///     source_id  TEXT PRIMARY KEY,
///     state_json TEXT NOT NULL,
///     updated_at TEXT NOT NULL  -- ISO 8601
/// );
/// ```
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Opens (or creates) the database and ensures the table exists.
    ///
    /// Pass `":memory:"` for a throwaway store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    fn create_table(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS source_state (
                source_id  TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub(super) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, source_id: &str) -> Result<Option<StoredState>, StoreError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT state_json FROM source_state WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set(&self, source_id: &str, state: &StoredState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        self.lock()?.execute(
            "INSERT INTO source_state (source_id, state_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(source_id) DO UPDATE SET
                state_json = excluded.state_json,
                updated_at = excluded.updated_at",
            params![source_id, json, state.updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, source_id: &str) -> Result<(), StoreError> {
        self.lock()?.execute(
            "DELETE FROM source_state WHERE source_id = ?1",
            params![source_id],
        )?;
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT source_id FROM source_state ORDER BY source_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let ids = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}
