//! Human-Review Queue: a durable `pending` table holding proposals and
//! finality-review payloads awaiting a human decision.

use std::sync::Mutex;

use conclave_runtime::types::{Proposal, ScopeId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReviewError;

/// What kind of human decision a pending row is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingPayload {
    /// A governed proposal waiting on approve/reject.
    AdvanceState { proposal: Proposal },
    /// A near-finality decision waiting on approve_finality/provide_resolution/escalate/defer.
    FinalityReview { dimension_breakdown: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRow {
    pub proposal_id: Uuid,
    pub scope_id: ScopeId,
    pub payload: PendingPayload,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The four finality-review resolution options from spec.md's review flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinalityOption {
    ApproveFinality,
    ProvideResolution,
    Escalate,
    Defer,
}

pub struct PendingStore {
    conn: Mutex<Connection>,
}

impl PendingStore {
    pub fn open_in_memory() -> Result<Self, ReviewError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &std::path::Path) -> Result<Self, ReviewError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), ReviewError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending (
                proposal_id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Upsert; idempotent per `proposal_id`.
    pub fn add_pending(
        &self,
        proposal_id: Uuid,
        scope_id: ScopeId,
        payload: PendingPayload,
    ) -> Result<(), ReviewError> {
        if matches!(payload, PendingPayload::FinalityReview { .. })
            && self.has_pending_finality_review(scope_id)?
        {
            return Err(ReviewError::DuplicateFinalityReview(proposal_id));
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pending (proposal_id, scope_id, payload, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)
             ON CONFLICT(proposal_id) DO UPDATE SET payload = excluded.payload",
            params![
                proposal_id.to_string(),
                scope_id.to_string(),
                serde_json::to_string(&payload)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List rows with `status='pending'`, oldest first.
    pub fn get_pending(&self) -> Result<Vec<PendingRow>, ReviewError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT proposal_id, scope_id, payload, status, created_at FROM pending
             WHERE status = 'pending' ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_pending)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Enforces I7: at most one pending `finality_review` per scope.
    pub fn has_pending_finality_review(&self, scope_id: ScopeId) -> Result<bool, ReviewError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT payload FROM pending WHERE scope_id = ?1 AND status = 'pending'",
        )?;
        let found = stmt
            .query_map(params![scope_id.to_string()], |row| {
                row.get::<_, String>(0)
            })?
            .filter_map(Result::ok)
            .any(|payload| {
                serde_json::from_str::<PendingPayload>(&payload)
                    .map(|p| matches!(p, PendingPayload::FinalityReview { .. }))
                    .unwrap_or(false)
            });
        Ok(found)
    }

    /// Removes a resolved row and returns the proposal payload it carried.
    /// Errors if the row is a `finality_review` payload — callers must use
    /// `resolve_finality_pending` for those.
    pub fn approve_pending(&self, id: Uuid) -> Result<Proposal, ReviewError> {
        let row = self.get_row(id)?;
        let proposal = match row.payload {
            PendingPayload::AdvanceState { proposal } => proposal,
            PendingPayload::FinalityReview { .. } => return Err(ReviewError::WrongResolutionPath),
        };
        self.delete(id)?;
        Ok(proposal)
    }

    /// Resolves a `finality_review` row with one of the four human options.
    pub fn resolve_finality_pending(
        &self,
        id: Uuid,
        option: FinalityOption,
        days: Option<u32>,
    ) -> Result<(ScopeId, FinalityOption, Option<u32>), ReviewError> {
        let row = self.get_row(id)?;
        if !matches!(row.payload, PendingPayload::FinalityReview { .. }) {
            return Err(ReviewError::WrongResolutionPath);
        }
        self.delete(id)?;
        Ok((row.scope_id, option, days))
    }

    /// Rejects a pending `advance_state` row with a reason, removing it.
    pub fn reject_pending(&self, id: Uuid, reason: &str) -> Result<(ScopeId, String), ReviewError> {
        let row = self.get_row(id)?;
        self.delete(id)?;
        Ok((row.scope_id, reason.to_string()))
    }

    fn get_row(&self, id: Uuid) -> Result<PendingRow, ReviewError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT proposal_id, scope_id, payload, status, created_at FROM pending WHERE proposal_id = ?1",
            params![id.to_string()],
            Self::row_to_pending,
        )
        .optional()?
        .ok_or(ReviewError::NotFound(id))
    }

    fn delete(&self, id: Uuid) -> Result<(), ReviewError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM pending WHERE proposal_id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    fn row_to_pending(row: &rusqlite::Row) -> rusqlite::Result<PendingRow> {
        let proposal_id: String = row.get(0)?;
        let scope_id: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let status: String = row.get(3)?;
        let created_at: String = row.get(4)?;

        Ok(PendingRow {
            proposal_id: proposal_id.parse().expect("stored uuid is always valid"),
            scope_id: scope_id.parse().expect("stored scope id is always valid"),
            payload: serde_json::from_str(&payload).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
            })?,
            status,
            created_at: created_at
                .parse()
                .expect("stored timestamp is always valid rfc3339"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_runtime::types::{Action, AgentId, ProposalId, ScopeStatus};

    fn sample_proposal(scope_id: ScopeId) -> Proposal {
        Proposal {
            id: ProposalId::new(),
            scope_id,
            role: "planner".into(),
            agent_id: AgentId::new(),
            actions: vec![Action::AdvanceState {
                to: ScopeStatus::Resolved,
            }],
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn add_then_get_pending_lists_it() {
        let store = PendingStore::open_in_memory().unwrap();
        let scope_id = ScopeId::new();
        let proposal = sample_proposal(scope_id);
        store
            .add_pending(
                proposal.id.0,
                scope_id,
                PendingPayload::AdvanceState {
                    proposal: proposal.clone(),
                },
            )
            .unwrap();

        let pending = store.get_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].scope_id, scope_id);
    }

    #[test]
    fn approve_pending_removes_row_and_returns_proposal() {
        let store = PendingStore::open_in_memory().unwrap();
        let scope_id = ScopeId::new();
        let proposal = sample_proposal(scope_id);
        let id: Uuid = proposal.id.0;
        store
            .add_pending(
                id,
                scope_id,
                PendingPayload::AdvanceState {
                    proposal: proposal.clone(),
                },
            )
            .unwrap();

        let approved = store.approve_pending(id).unwrap();
        assert_eq!(approved.id, proposal.id);
        assert!(store.get_pending().unwrap().is_empty());
    }

    #[test]
    fn second_finality_review_for_same_scope_is_rejected() {
        let store = PendingStore::open_in_memory().unwrap();
        let scope_id = ScopeId::new();
        store
            .add_pending(
                Uuid::new_v4(),
                scope_id,
                PendingPayload::FinalityReview {
                    dimension_breakdown: serde_json::json!({}),
                },
            )
            .unwrap();

        let err = store
            .add_pending(
                Uuid::new_v4(),
                scope_id,
                PendingPayload::FinalityReview {
                    dimension_breakdown: serde_json::json!({}),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ReviewError::DuplicateFinalityReview(_)));
    }

    #[test]
    fn approve_pending_on_finality_review_uses_wrong_path() {
        let store = PendingStore::open_in_memory().unwrap();
        let scope_id = ScopeId::new();
        let id = Uuid::new_v4();
        store
            .add_pending(
                id,
                scope_id,
                PendingPayload::FinalityReview {
                    dimension_breakdown: serde_json::json!({}),
                },
            )
            .unwrap();

        let err = store.approve_pending(id).unwrap_err();
        assert!(matches!(err, ReviewError::WrongResolutionPath));
    }
}
