//! Epoch-gated compare-and-swap store for [`crate::types::Scope`].
//!
//! Every state advance is a single `UPDATE ... WHERE epoch = ?` — the affected
//! row count tells the caller whether its view was stale, the same pattern
//! the donor job store used to detect a job already claimed by another
//! worker. No read-modify-write race window: the comparison and the write
//! happen in the same statement.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::store::StoreError;
use crate::types::{Epoch, Scope, ScopeId, ScopeStatus};

#[async_trait]
pub trait StateGraphStore: Send + Sync {
    async fn create(&self, scope: Scope) -> Result<(), StoreError>;
    async fn get(&self, id: ScopeId) -> Result<Option<Scope>, StoreError>;
    /// Advance `id` to `to` iff its current epoch equals `expected_epoch`.
    /// Returns the new epoch on success.
    async fn advance(
        &self,
        id: ScopeId,
        expected_epoch: Epoch,
        to: ScopeStatus,
    ) -> Result<Epoch, StoreError>;
}

pub struct SqliteStateGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteStateGraphStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scopes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                epoch INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                metadata TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn row_to_scope(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, i64, String, String, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }
}

fn status_to_str(status: ScopeStatus) -> &'static str {
    match status {
        ScopeStatus::Active => "ACTIVE",
        ScopeStatus::Paused => "PAUSED",
        ScopeStatus::AwaitingHuman => "AWAITING_HUMAN",
        ScopeStatus::Resolved => "RESOLVED",
        ScopeStatus::Escalated => "ESCALATED",
        ScopeStatus::Blocked => "BLOCKED",
        ScopeStatus::Expired => "EXPIRED",
    }
}

fn str_to_status(s: &str) -> ScopeStatus {
    match s {
        "PAUSED" => ScopeStatus::Paused,
        "AWAITING_HUMAN" => ScopeStatus::AwaitingHuman,
        "RESOLVED" => ScopeStatus::Resolved,
        "ESCALATED" => ScopeStatus::Escalated,
        "BLOCKED" => ScopeStatus::Blocked,
        "EXPIRED" => ScopeStatus::Expired,
        _ => ScopeStatus::Active,
    }
}

#[async_trait]
impl StateGraphStore for SqliteStateGraphStore {
    async fn create(&self, scope: Scope) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("state graph mutex poisoned");
        conn.execute(
            "INSERT INTO scopes (id, name, status, epoch, created_at, updated_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                scope.id.to_string(),
                scope.name,
                status_to_str(scope.status),
                scope.epoch.0 as i64,
                scope.created_at.to_rfc3339(),
                scope.updated_at.to_rfc3339(),
                serde_json::to_string(&scope.metadata)?,
            ],
        )?;
        Ok(())
    }

    async fn get(&self, id: ScopeId) -> Result<Option<Scope>, StoreError> {
        let conn = self.conn.lock().expect("state graph mutex poisoned");
        let row = conn
            .query_row(
                "SELECT id, name, status, epoch, created_at, updated_at, metadata FROM scopes WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_scope,
            )
            .optional()?;
        let Some((id, name, status, epoch, created_at, updated_at, metadata)) = row else {
            return Ok(None);
        };
        Ok(Some(Scope {
            id: id.parse().expect("stored scope id is always a valid uuid"),
            name,
            status: str_to_status(&status),
            epoch: Epoch(epoch as u64),
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
            metadata: serde_json::from_str(&metadata)?,
        }))
    }

    async fn advance(
        &self,
        id: ScopeId,
        expected_epoch: Epoch,
        to: ScopeStatus,
    ) -> Result<Epoch, StoreError> {
        let next = expected_epoch.next();
        let conn = self.conn.lock().expect("state graph mutex poisoned");
        let affected = conn.execute(
            "UPDATE scopes SET status = ?1, epoch = ?2, updated_at = ?3
             WHERE id = ?4 AND epoch = ?5",
            params![
                status_to_str(to),
                next.0 as i64,
                Utc::now().to_rfc3339(),
                id.to_string(),
                expected_epoch.0 as i64,
            ],
        )?;
        if affected == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM scopes WHERE id = ?1",
                    params![id.to_string()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::ScopeNotFound(id));
            }
            return Err(StoreError::EpochConflict {
                scope_id: id,
                expected: expected_epoch,
            });
        }
        Ok(next)
    }
}
