//! Unified semantic graph: claims, goals, risks, contradictions, and
//! assessments accumulated about a scope, held as typed nodes connected by
//! typed edges rather than one table per kind.
//!
//! Claims are monotonic: a later upsert of the same id only raises
//! confidence, never lowers it (I4), and a contradiction resolution is
//! irreversible -- once a `resolves` edge exists between a pair, no new
//! `contradicts` edge can be inserted between the same pair (I3). Nodes are
//! never deleted, only marked `irrelevant` (I5). Backed by `rusqlite` with
//! each mutation in its own transaction, the same row-mapping idiom as
//! [`crate::store`].

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::types::{ClaimId, GoalId, RiskId, ScopeId};

/// A risk at or above this severity counts toward
/// [`FinalitySnapshot::risks_critical_active_count`].
pub const CRITICAL_RISK_SEVERITY: f64 = 0.9;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("claim not found: {0}")]
    ClaimNotFound(ClaimId),
    #[error("claim {0} is already resolved and cannot be mutated")]
    ClaimResolved(ClaimId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Claim,
    Goal,
    Risk,
    Contradiction,
    Assessment,
}

fn node_type_to_str(t: NodeType) -> &'static str {
    match t {
        NodeType::Claim => "claim",
        NodeType::Goal => "goal",
        NodeType::Risk => "risk",
        NodeType::Contradiction => "contradiction",
        NodeType::Assessment => "assessment",
    }
}

fn str_to_node_type(s: &str) -> NodeType {
    match s {
        "goal" => NodeType::Goal,
        "risk" => NodeType::Risk,
        "contradiction" => NodeType::Contradiction,
        "assessment" => NodeType::Assessment,
        _ => NodeType::Claim,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Irrelevant,
    Resolved,
}

fn node_status_to_str(s: NodeStatus) -> &'static str {
    match s {
        NodeStatus::Active => "active",
        NodeStatus::Irrelevant => "irrelevant",
        NodeStatus::Resolved => "resolved",
    }
}

fn str_to_node_status(s: &str) -> NodeStatus {
    match s {
        "irrelevant" => NodeStatus::Irrelevant,
        "resolved" => NodeStatus::Resolved,
        _ => NodeStatus::Active,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Contradicts,
    Resolves,
    Supports,
}

fn edge_type_to_str(t: EdgeType) -> &'static str {
    match t {
        EdgeType::Contradicts => "contradicts",
        EdgeType::Resolves => "resolves",
        EdgeType::Supports => "supports",
    }
}

fn str_to_edge_type(s: &str) -> EdgeType {
    match s {
        "resolves" => EdgeType::Resolves,
        "supports" => EdgeType::Supports,
        _ => EdgeType::Contradicts,
    }
}

/// A node of the semantic graph, in its raw unprojected form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticNode {
    pub node_id: uuid::Uuid,
    pub scope_id: ScopeId,
    pub node_type: NodeType,
    pub content: String,
    pub confidence: f64,
    pub status: NodeStatus,
    pub source_ref: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An edge of the semantic graph connecting two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticEdge {
    pub edge_id: uuid::Uuid,
    pub scope_id: ScopeId,
    pub source_id: uuid::Uuid,
    pub target_id: uuid::Uuid,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub metadata: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Projection of a claim node back into its subject/predicate/object shape
/// for callers that only care about claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub scope_id: ScopeId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub resolved: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub scope_id: ScopeId,
    pub description: String,
    pub weight: f64,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: RiskId,
    pub scope_id: ScopeId,
    pub description: String,
    pub severity: f64,
    pub updated_at: DateTime<Utc>,
}

/// A single fact to reconcile into the scope's fact-sourced claims during
/// [`SemanticGraph::sync_facts`]. `contradicts` names the content of other
/// fact-sourced claims this one conflicts with, as parsed upstream by an
/// NLI pass.
pub struct FactInput<'a> {
    pub content: &'a str,
    pub confidence: f64,
    pub contradicts: &'a [String],
}

/// Outcome counts of one [`SemanticGraph::sync_facts`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub reactivated: usize,
    pub created: usize,
    pub marked_irrelevant: usize,
    pub contradictions_added: usize,
}

/// The aggregated view of a scope's semantic graph the finality evaluator
/// scores against. `scope_idle_cycles` and `scope_last_delta_age_ms` are
/// always `0` here -- the semantic graph has no notion of rounds or elapsed
/// time between them; a caller that also tracks convergence history
/// overlays the real values before evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalitySnapshot {
    pub claims_active_count: usize,
    pub claims_active_min_confidence: f64,
    pub claims_active_avg_confidence: f64,
    pub contradictions_unresolved_count: usize,
    pub contradictions_total_count: usize,
    pub risks_critical_active_count: usize,
    pub goals_completion_ratio: f64,
    pub scope_risk_score: f64,
    pub scope_idle_cycles: u32,
    pub scope_last_delta_age_ms: i64,
}

pub struct SemanticGraph {
    conn: Mutex<Connection>,
}

impl SemanticGraph {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                node_id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL,
                node_type TEXT NOT NULL,
                content TEXT NOT NULL,
                subject TEXT,
                predicate TEXT,
                object TEXT,
                confidence REAL NOT NULL DEFAULT 1.0,
                weight REAL,
                status TEXT NOT NULL,
                source_ref TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS edges (
                edge_id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0,
                metadata TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_scope_type_content
                ON nodes(scope_id, node_type, content);
            CREATE INDEX IF NOT EXISTS idx_edges_pair
                ON edges(scope_id, source_id, target_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, GraphError> {
        Self::open(":memory:")
    }

    // -- claims ----------------------------------------------------------

    pub async fn upsert_claim(
        &self,
        scope_id: ScopeId,
        claim_id: ClaimId,
        subject: &str,
        predicate: &str,
        object: &str,
        confidence: f64,
    ) -> Result<(), GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        let existing: Option<(f64, String)> = conn
            .query_row(
                "SELECT confidence, status FROM nodes WHERE node_id = ?1",
                params![claim_id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        if let Some((_, status)) = &existing {
            if str_to_node_status(status) == NodeStatus::Resolved {
                return Err(GraphError::ClaimResolved(claim_id));
            }
        }

        let next_confidence = match existing {
            Some((prior, _)) => prior.max(confidence),
            None => confidence,
        };
        let content = format!("{subject}|{predicate}|{object}");

        conn.execute(
            "INSERT INTO nodes
                (node_id, scope_id, node_type, content, subject, predicate, object,
                 confidence, status, source_ref, created_by, created_at, updated_at)
             VALUES (?1, ?2, 'claim', ?3, ?4, ?5, ?6, ?7, 'active', NULL, NULL, ?8, ?8)
             ON CONFLICT(node_id) DO UPDATE SET
                content = excluded.content,
                object = excluded.object,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at",
            params![
                claim_id.to_string(),
                scope_id.to_string(),
                content,
                subject,
                predicate,
                object,
                next_confidence,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_claim(&self, claim_id: ClaimId) -> Result<Option<Claim>, GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        conn.query_row(
            "SELECT node_id, scope_id, subject, predicate, object, confidence, status, updated_at
             FROM nodes WHERE node_id = ?1 AND node_type = 'claim'",
            params![claim_id.to_string()],
            Self::row_to_claim,
        )
        .optional()
        .map_err(GraphError::from)
    }

    fn row_to_claim(row: &rusqlite::Row) -> rusqlite::Result<Claim> {
        let id: String = row.get(0)?;
        let scope_id: String = row.get(1)?;
        let status: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(Claim {
            id: id.parse().expect("stored claim id is always valid"),
            scope_id: scope_id.parse().expect("stored scope id is always valid"),
            subject: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            predicate: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            object: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            confidence: row.get(5)?,
            resolved: str_to_node_status(&status) == NodeStatus::Resolved,
            updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }

    /// Marks both claims resolved and records the resolution as a
    /// `resolves` edge between them; afterwards neither claim accepts
    /// further confidence-raising upserts (I3, I4).
    pub async fn resolve_contradiction(
        &self,
        scope_id: ScopeId,
        claim_a: ClaimId,
        claim_b: ClaimId,
        resolution: &str,
    ) -> Result<(), GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        let now = Utc::now().to_rfc3339();
        for id in [claim_a, claim_b] {
            let affected = conn.execute(
                "UPDATE nodes SET status = 'resolved', updated_at = ?2
                 WHERE node_id = ?1 AND node_type = 'claim'",
                params![id.to_string(), now],
            )?;
            if affected == 0 {
                return Err(GraphError::ClaimNotFound(id));
            }
        }
        conn.execute(
            "INSERT INTO edges
                (edge_id, scope_id, source_id, target_id, edge_type, weight, metadata, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, 'resolves', 1.0, ?5, NULL, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                scope_id.to_string(),
                claim_a.to_string(),
                claim_b.to_string(),
                serde_json::json!({ "resolution": resolution }).to_string(),
                now,
            ],
        )?;
        Ok(())
    }

    // -- goals -------------------------------------------------------------

    pub async fn upsert_goal(
        &self,
        scope_id: ScopeId,
        goal_id: GoalId,
        description: &str,
        weight: f64,
    ) -> Result<(), GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        conn.execute(
            "INSERT INTO nodes
                (node_id, scope_id, node_type, content, weight, status, created_at, updated_at)
             VALUES (?1, ?2, 'goal', ?3, ?4, 'active', ?5, ?5)
             ON CONFLICT(node_id) DO UPDATE SET
                content = excluded.content,
                weight = excluded.weight,
                updated_at = excluded.updated_at",
            params![
                goal_id.to_string(),
                scope_id.to_string(),
                description,
                weight,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Marks a goal node resolved -- it now counts toward
    /// `goals_completion_ratio`. Irreversible, matching I5: a completed goal
    /// is never moved back to active.
    pub async fn complete_goal(&self, goal_id: GoalId) -> Result<(), GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        conn.execute(
            "UPDATE nodes SET status = 'resolved', updated_at = ?2
             WHERE node_id = ?1 AND node_type = 'goal'",
            params![goal_id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub async fn goals_for_scope(&self, scope_id: ScopeId) -> Result<Vec<Goal>, GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT node_id, scope_id, content, weight, status, updated_at
             FROM nodes WHERE scope_id = ?1 AND node_type = 'goal'",
        )?;
        let rows = stmt
            .query_map(params![scope_id.to_string()], |row| {
                let id: String = row.get(0)?;
                let scope_id: String = row.get(1)?;
                let status: String = row.get(4)?;
                let updated_at: String = row.get(5)?;
                Ok(Goal {
                    id: id.parse().expect("stored goal id is always valid"),
                    scope_id: scope_id.parse().expect("stored scope id is always valid"),
                    description: row.get(2)?,
                    weight: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    completed: str_to_node_status(&status) == NodeStatus::Resolved,
                    updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- risks ---------------------------------------------------------

    pub async fn flag_risk(
        &self,
        scope_id: ScopeId,
        risk_id: RiskId,
        description: &str,
        severity: f64,
    ) -> Result<(), GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        conn.execute(
            "INSERT INTO nodes
                (node_id, scope_id, node_type, content, weight, status, created_at, updated_at)
             VALUES (?1, ?2, 'risk', ?3, ?4, 'active', ?5, ?5)
             ON CONFLICT(node_id) DO UPDATE SET
                content = excluded.content,
                weight = MAX(nodes.weight, excluded.weight),
                updated_at = excluded.updated_at",
            params![
                risk_id.to_string(),
                scope_id.to_string(),
                description,
                severity,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn risks_for_scope(&self, scope_id: ScopeId) -> Result<Vec<Risk>, GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT node_id, scope_id, content, weight, updated_at
             FROM nodes WHERE scope_id = ?1 AND node_type = 'risk'",
        )?;
        let rows = stmt
            .query_map(params![scope_id.to_string()], |row| {
                let id: String = row.get(0)?;
                let scope_id: String = row.get(1)?;
                let updated_at: String = row.get(4)?;
                Ok(Risk {
                    id: id.parse().expect("stored risk id is always valid"),
                    scope_id: scope_id.parse().expect("stored scope id is always valid"),
                    description: row.get(2)?,
                    severity: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- fact sync -------------------------------------------------------

    /// Reconciles a batch of freshly extracted facts against the scope's
    /// existing fact-sourced claims (§4.10): prefix-matches each incoming
    /// fact by content against an existing `source_ref = "facts"` claim,
    /// reactivating and raising confidence when the new value is at least
    /// as high (I4); inserts unmatched facts as new active claims; marks
    /// any previously fact-sourced claim that didn't match this round as
    /// irrelevant (I5, never deleted). `contradicts` entries become
    /// `contradicts` edges, skipped when a `resolves` edge already covers
    /// the pair (I3).
    pub async fn sync_facts(
        &self,
        scope_id: ScopeId,
        facts: &[FactInput<'_>],
        created_by: &str,
    ) -> Result<SyncReport, GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        let now = Utc::now().to_rfc3339();
        let mut report = SyncReport::default();

        let mut existing: Vec<(String, String, NodeStatus)> = {
            let mut stmt = conn.prepare(
                "SELECT node_id, content, status FROM nodes
                 WHERE scope_id = ?1 AND node_type = 'claim' AND source_ref = 'facts'",
            )?;
            stmt.query_map(params![scope_id.to_string()], |row| {
                let status: String = row.get(2)?;
                Ok((row.get(0)?, row.get(1)?, str_to_node_status(&status)))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        let mut matched_ids = std::collections::HashSet::new();
        let mut content_to_id = std::collections::HashMap::new();

        for fact in facts {
            let prefix_match = existing
                .iter()
                .find(|(_, content, _)| content.starts_with(fact.content) || fact.content.starts_with(content.as_str()));

            match prefix_match {
                Some((node_id, _, status)) => {
                    let node_id = node_id.clone();
                    matched_ids.insert(node_id.clone());
                    content_to_id.insert(fact.content.to_string(), node_id.clone());

                    let current_confidence: f64 = conn.query_row(
                        "SELECT confidence FROM nodes WHERE node_id = ?1",
                        params![node_id],
                        |r| r.get(0),
                    )?;
                    let next_confidence = if fact.confidence >= current_confidence {
                        fact.confidence
                    } else {
                        current_confidence
                    };
                    conn.execute(
                        "UPDATE nodes SET content = ?2, confidence = ?3, status = 'active', updated_at = ?4
                         WHERE node_id = ?1",
                        params![node_id, fact.content, next_confidence, now],
                    )?;
                    if *status != NodeStatus::Active {
                        report.reactivated += 1;
                    }
                }
                None => {
                    let node_id = uuid::Uuid::new_v4().to_string();
                    conn.execute(
                        "INSERT INTO nodes
                            (node_id, scope_id, node_type, content, confidence, status,
                             source_ref, created_by, created_at, updated_at)
                         VALUES (?1, ?2, 'claim', ?3, ?4, 'active', 'facts', ?5, ?6, ?6)",
                        params![node_id, scope_id.to_string(), fact.content, fact.confidence, created_by, now],
                    )?;
                    existing.push((node_id.clone(), fact.content.to_string(), NodeStatus::Active));
                    matched_ids.insert(node_id.clone());
                    content_to_id.insert(fact.content.to_string(), node_id);
                    report.created += 1;
                }
            }
        }

        for (node_id, _, status) in &existing {
            if !matched_ids.contains(node_id) && *status == NodeStatus::Active {
                conn.execute(
                    "UPDATE nodes SET status = 'irrelevant', updated_at = ?2 WHERE node_id = ?1",
                    params![node_id, now],
                )?;
                report.marked_irrelevant += 1;
            }
        }

        for fact in facts {
            let Some(source_id) = content_to_id.get(fact.content) else {
                continue;
            };
            for conflicting_content in fact.contradicts {
                let Some(target_id) = content_to_id.get(conflicting_content) else {
                    continue;
                };
                if source_id == target_id {
                    continue;
                }
                let already_resolved: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM edges
                     WHERE edge_type = 'resolves'
                       AND ((source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1))",
                    params![source_id, target_id],
                    |r| r.get(0),
                )?;
                if already_resolved > 0 {
                    continue;
                }
                let already_contradicts: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM edges
                     WHERE edge_type = 'contradicts'
                       AND ((source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1))",
                    params![source_id, target_id],
                    |r| r.get(0),
                )?;
                if already_contradicts > 0 {
                    continue;
                }
                conn.execute(
                    "INSERT INTO edges
                        (edge_id, scope_id, source_id, target_id, edge_type, weight, metadata, created_by, created_at)
                     VALUES (?1, ?2, ?3, ?4, 'contradicts', 1.0, NULL, ?5, ?6)",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        scope_id.to_string(),
                        source_id,
                        target_id,
                        created_by,
                        now,
                    ],
                )?;
                report.contradictions_added += 1;
            }
        }

        Ok(report)
    }

    // -- finality aggregation --------------------------------------------

    /// Aggregates the scope's current nodes and edges into the snapshot the
    /// finality evaluator scores against (§4.10/§4.11).
    pub async fn finality_snapshot(&self, scope_id: ScopeId) -> Result<FinalitySnapshot, GraphError> {
        let conn = self.conn.lock().expect("graph mutex poisoned");
        let scope = scope_id.to_string();

        let claims_active_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE scope_id = ?1 AND node_type = 'claim' AND status = 'active'",
            params![scope],
            |r| r.get(0),
        )?;
        let (claims_active_min_confidence, claims_active_avg_confidence): (Option<f64>, Option<f64>) = conn
            .query_row(
                "SELECT MIN(confidence), AVG(confidence) FROM nodes
                 WHERE scope_id = ?1 AND node_type = 'claim' AND status = 'active'",
                params![scope],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;

        let contradictions_total_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE scope_id = ?1 AND edge_type = 'contradicts'",
            params![scope],
            |r| r.get(0),
        )?;
        let contradictions_unresolved_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges c
             WHERE c.scope_id = ?1 AND c.edge_type = 'contradicts'
               AND NOT EXISTS (
                    SELECT 1 FROM edges r
                    WHERE r.scope_id = c.scope_id AND r.edge_type = 'resolves'
                      AND ((r.source_id = c.source_id AND r.target_id = c.target_id)
                        OR (r.source_id = c.target_id AND r.target_id = c.source_id))
               )",
            params![scope],
            |r| r.get(0),
        )?;

        let risks_critical_active_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes
             WHERE scope_id = ?1 AND node_type = 'risk' AND status = 'active' AND weight >= ?2",
            params![scope, CRITICAL_RISK_SEVERITY],
            |r| r.get(0),
        )?;
        let scope_risk_score: Option<f64> = conn.query_row(
            "SELECT MAX(weight) FROM nodes WHERE scope_id = ?1 AND node_type = 'risk' AND status = 'active'",
            params![scope],
            |r| r.get(0),
        )?;

        let goals_total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE scope_id = ?1 AND node_type = 'goal'",
            params![scope],
            |r| r.get(0),
        )?;
        let goals_completed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE scope_id = ?1 AND node_type = 'goal' AND status = 'resolved'",
            params![scope],
            |r| r.get(0),
        )?;
        let goals_completion_ratio = if goals_total == 0 {
            1.0
        } else {
            goals_completed as f64 / goals_total as f64
        };

        Ok(FinalitySnapshot {
            claims_active_count: claims_active_count as usize,
            claims_active_min_confidence: claims_active_min_confidence.unwrap_or(1.0),
            claims_active_avg_confidence: claims_active_avg_confidence.unwrap_or(1.0),
            contradictions_unresolved_count: contradictions_unresolved_count as usize,
            contradictions_total_count: contradictions_total_count as usize,
            risks_critical_active_count: risks_critical_active_count as usize,
            goals_completion_ratio,
            scope_risk_score: scope_risk_score.unwrap_or(0.0),
            scope_idle_cycles: 0,
            scope_last_delta_age_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_only_raises_confidence() {
        let graph = SemanticGraph::open_in_memory().unwrap();
        let scope = ScopeId::new();
        let claim = ClaimId::new();
        graph.upsert_claim(scope, claim, "s", "p", "o", 0.4).await.unwrap();
        graph.upsert_claim(scope, claim, "s", "p", "o2", 0.2).await.unwrap();

        let stored = graph.get_claim(claim).await.unwrap().unwrap();
        assert_eq!(stored.confidence, 0.4);
        assert_eq!(stored.object, "o2");
    }

    #[tokio::test]
    async fn resolved_claim_rejects_further_mutation() {
        let graph = SemanticGraph::open_in_memory().unwrap();
        let scope = ScopeId::new();
        let a = ClaimId::new();
        let b = ClaimId::new();
        graph.upsert_claim(scope, a, "s", "p", "o", 0.5).await.unwrap();
        graph.upsert_claim(scope, b, "s", "p", "not-o", 0.5).await.unwrap();

        graph.resolve_contradiction(scope, a, b, "a wins").await.unwrap();

        let err = graph.upsert_claim(scope, a, "s", "p", "o", 0.9).await.unwrap_err();
        assert!(matches!(err, GraphError::ClaimResolved(_)));
    }

    #[tokio::test]
    async fn risk_severity_is_monotonic() {
        let graph = SemanticGraph::open_in_memory().unwrap();
        let scope = ScopeId::new();
        let risk = RiskId::new();
        graph.flag_risk(scope, risk, "late payment", 0.3).await.unwrap();
        graph.flag_risk(scope, risk, "late payment", 0.1).await.unwrap();

        let risks = graph.risks_for_scope(scope).await.unwrap();
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].severity, 0.3);
    }

    #[tokio::test]
    async fn resolve_contradiction_blocks_future_contradicts_edge() {
        let graph = SemanticGraph::open_in_memory().unwrap();
        let scope = ScopeId::new();
        let a = ClaimId::new();
        let b = ClaimId::new();
        graph.upsert_claim(scope, a, "s", "p", "o", 0.5).await.unwrap();
        graph.upsert_claim(scope, b, "s", "p", "not-o", 0.5).await.unwrap();
        graph.resolve_contradiction(scope, a, b, "a wins").await.unwrap();

        let facts = vec![
            FactInput { content: "s|p|o", confidence: 0.6, contradicts: &["s|p|not-o".to_string()] },
            FactInput { content: "s|p|not-o", confidence: 0.6, contradicts: &[] },
        ];
        let report = graph.sync_facts(scope, &facts, "extractor").await.unwrap();
        assert_eq!(report.contradictions_added, 0);

        let snapshot = graph.finality_snapshot(scope).await.unwrap();
        assert_eq!(snapshot.contradictions_total_count, 0);
    }

    #[tokio::test]
    async fn sync_facts_reactivates_and_marks_unmatched_irrelevant() {
        let graph = SemanticGraph::open_in_memory().unwrap();
        let scope = ScopeId::new();

        let round1 = vec![
            FactInput { content: "invoice-1 is overdue", confidence: 0.6, contradicts: &[] },
        ];
        let report1 = graph.sync_facts(scope, &round1, "extractor").await.unwrap();
        assert_eq!(report1.created, 1);

        let round2: Vec<FactInput> = vec![];
        let report2 = graph.sync_facts(scope, &round2, "extractor").await.unwrap();
        assert_eq!(report2.marked_irrelevant, 1);

        let round3 = vec![
            FactInput { content: "invoice-1 is overdue", confidence: 0.8, contradicts: &[] },
        ];
        let report3 = graph.sync_facts(scope, &round3, "extractor").await.unwrap();
        assert_eq!(report3.reactivated, 1);

        let snapshot = graph.finality_snapshot(scope).await.unwrap();
        assert_eq!(snapshot.claims_active_count, 1);
        assert_eq!(snapshot.claims_active_avg_confidence, 0.8);
    }

    #[tokio::test]
    async fn finality_snapshot_vacuous_scope_is_all_satisfied() {
        let graph = SemanticGraph::open_in_memory().unwrap();
        let scope = ScopeId::new();
        let snapshot = graph.finality_snapshot(scope).await.unwrap();
        assert_eq!(snapshot.claims_active_count, 0);
        assert_eq!(snapshot.contradictions_total_count, 0);
        assert_eq!(snapshot.goals_completion_ratio, 1.0);
        assert_eq!(snapshot.scope_risk_score, 0.0);
    }

    #[tokio::test]
    async fn goal_completion_ratio_tracks_resolved_goals() {
        let graph = SemanticGraph::open_in_memory().unwrap();
        let scope = ScopeId::new();
        let g1 = GoalId::new();
        let g2 = GoalId::new();
        graph.upsert_goal(scope, g1, "ship it", 0.6).await.unwrap();
        graph.upsert_goal(scope, g2, "document it", 0.4).await.unwrap();
        graph.complete_goal(g1).await.unwrap();

        let snapshot = graph.finality_snapshot(scope).await.unwrap();
        assert_eq!(snapshot.goals_completion_ratio, 0.5);
    }
}
