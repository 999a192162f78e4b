//! Write-ahead event log.
//!
//! Every [`crate::types::ContextEvent`] is appended here before the agent
//! loop acts on it, so a crashed process can replay unacknowledged events on
//! restart instead of losing them. Backed by `rusqlite` in WAL journal mode,
//! mirroring the donor scheduler's job store: bundled SQLite, typed
//! row-mapping, a connection guarded by a blocking-safe mutex since
//! `rusqlite::Connection` is not `Send`-safe across an `.await`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::types::{EventId, ScopeId};

#[derive(Debug, Error)]
pub enum WalError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("entry not found: {0}")]
    NotFound(EventId),
}

/// A single appended, not-yet-acknowledged log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub id: EventId,
    pub scope_id: ScopeId,
    pub source: String,
    pub payload: serde_json::Value,
    pub appended_at: DateTime<Utc>,
    pub acked: bool,
}

/// Append-only durable log with idempotent replay of un-acked entries.
pub struct EventLog {
    conn: Mutex<Connection>,
}

impl EventLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wal_entries (
                id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL,
                source TEXT NOT NULL,
                payload TEXT NOT NULL,
                appended_at TEXT NOT NULL,
                acked INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_wal_unacked ON wal_entries (acked, appended_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, WalError> {
        Self::open(":memory:")
    }

    pub fn append(
        &self,
        scope_id: ScopeId,
        source: &str,
        payload: serde_json::Value,
    ) -> Result<EventId, WalError> {
        let id = EventId::new();
        let now = Utc::now();
        let conn = self.conn.lock().expect("wal mutex poisoned");
        conn.execute(
            "INSERT INTO wal_entries (id, scope_id, source, payload, appended_at, acked)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                id.to_string(),
                scope_id.to_string(),
                source,
                serde_json::to_string(&payload)?,
                now.to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    pub fn ack(&self, id: EventId) -> Result<(), WalError> {
        let conn = self.conn.lock().expect("wal mutex poisoned");
        let affected = conn.execute(
            "UPDATE wal_entries SET acked = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(WalError::NotFound(id));
        }
        Ok(())
    }

    /// Entries never acked, oldest first — what a restarting agent loop
    /// should replay before resuming live consumption.
    pub fn unacked(&self) -> Result<Vec<WalEntry>, WalError> {
        let conn = self.conn.lock().expect("wal mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, scope_id, source, payload, appended_at, acked
             FROM wal_entries WHERE acked = 0 ORDER BY appended_at ASC",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|r| r.map_err(WalError::from))
            .collect()
    }

    pub fn get(&self, id: EventId) -> Result<Option<WalEntry>, WalError> {
        let conn = self.conn.lock().expect("wal mutex poisoned");
        conn.query_row(
            "SELECT id, scope_id, source, payload, appended_at, acked
             FROM wal_entries WHERE id = ?1",
            params![id.to_string()],
            Self::map_row,
        )
        .optional()?
        .transpose()
        .map_err(WalError::from)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Result<WalEntry, serde_json::Error>> {
        let id: String = row.get(0)?;
        let scope_id: String = row.get(1)?;
        let source: String = row.get(2)?;
        let payload: String = row.get(3)?;
        let appended_at: String = row.get(4)?;
        let acked: i64 = row.get(5)?;
        Ok((|| {
            Ok(WalEntry {
                id: id.parse().map_err(|_| serde_json::Error::io(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad event id")))?,
                scope_id: scope_id.parse().map_err(|_| serde_json::Error::io(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad scope id")))?,
                source,
                payload: serde_json::from_str(&payload)?,
                appended_at: appended_at
                    .parse::<DateTime<Utc>>()
                    .map_err(|_| serde_json::Error::io(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad timestamp")))?,
                acked: acked != 0,
            })
        })())
    }
}
