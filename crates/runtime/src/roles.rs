//! Role runners: facts, drift, planner, status.
//!
//! A compile-time `role → requirements` table, matching the donor's agent
//! registry convention ("role name selects a runner" rather than runtime
//! discovery), plus the four runner functions themselves. Each runner is a
//! pure function of `(scope, prior output, context events)` except the
//! facts runner, which calls the extraction worker over HTTP behind the
//! [`ExtractionWorker`] trait so tests can supply an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Action, AgentId, ClaimId, ContextEvent, GoalId, Proposal, RiskId, ScopeId, ScopeStatus};

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("extraction worker error: {0}")]
    Extraction(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// Static per-role requirements, mirroring the donor's compile-time
/// role→jobType registry.
#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    pub name: &'static str,
    pub requires_node: Option<ScopeStatus>,
    pub proposes_advance: bool,
}

pub const ROLES: &[RoleSpec] = &[
    RoleSpec {
        name: "facts",
        requires_node: None,
        proposes_advance: true,
    },
    RoleSpec {
        name: "drift",
        requires_node: Some(ScopeStatus::Active),
        proposes_advance: true,
    },
    RoleSpec {
        name: "planner",
        requires_node: Some(ScopeStatus::Active),
        proposes_advance: false,
    },
    RoleSpec {
        name: "status",
        requires_node: None,
        proposes_advance: false,
    },
];

pub fn role_spec(name: &str) -> Result<RoleSpec, RoleError> {
    ROLES
        .iter()
        .copied()
        .find(|r| r.name == name)
        .ok_or_else(|| RoleError::UnknownRole(name.to_string()))
}

/// Facts extracted from context, as returned by the extraction worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFacts {
    pub claims: Vec<(String, String, String, f64)>,
    pub goals: Vec<(String, f64)>,
    pub risks: Vec<(String, f64)>,
}

#[async_trait]
pub trait ExtractionWorker: Send + Sync {
    async fn extract(
        &self,
        context: &[ContextEvent],
        previous_facts: Option<&ExtractedFacts>,
    ) -> Result<ExtractedFacts, RoleError>;
}

/// Pulls the last N context events, calls the extraction worker, and turns
/// the result into an `UpsertClaim`/`UpsertGoal`/`FlagRisk` proposal.
pub async fn run_facts(
    scope_id: ScopeId,
    agent_id: AgentId,
    context: &[ContextEvent],
    previous_facts: Option<&ExtractedFacts>,
    worker: &dyn ExtractionWorker,
) -> Result<Proposal, RoleError> {
    let facts = worker.extract(context, previous_facts).await?;

    let mut actions = Vec::new();
    for (subject, predicate, object, confidence) in facts.claims {
        actions.push(Action::UpsertClaim {
            claim_id: ClaimId::new(),
            subject,
            predicate,
            object,
            confidence,
        });
    }
    for (description, weight) in facts.goals {
        actions.push(Action::UpsertGoal {
            goal_id: GoalId::new(),
            description,
            weight,
        });
    }
    for (description, severity) in facts.risks {
        actions.push(Action::FlagRisk {
            risk_id: RiskId::new(),
            description,
            severity,
        });
    }

    Ok(Proposal {
        id: crate::types::ProposalId::new(),
        scope_id,
        role: "facts".into(),
        agent_id,
        actions,
        created_at: chrono::Utc::now(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftLevel {
    None,
    Low,
    Medium,
    High,
}

/// Classifies drift between the current and previous claim confidence sets
/// purely from the data already on hand; no external call.
pub fn run_drift(prior_avg_confidence: f64, current_avg_confidence: f64) -> DriftLevel {
    let delta = (prior_avg_confidence - current_avg_confidence).abs();
    if delta < 0.05 {
        DriftLevel::None
    } else if delta < 0.15 {
        DriftLevel::Low
    } else if delta < 0.35 {
        DriftLevel::Medium
    } else {
        DriftLevel::High
    }
}

/// Given facts and drift, proposes an advance to `DriftChecked` when drift
/// is manageable; otherwise proposes staying `Active` for another cycle.
pub fn run_planner(
    scope_id: ScopeId,
    agent_id: AgentId,
    drift: DriftLevel,
) -> Proposal {
    let to = match drift {
        DriftLevel::None | DriftLevel::Low => ScopeStatus::Active,
        DriftLevel::Medium | DriftLevel::High => ScopeStatus::AwaitingHuman,
    };
    Proposal {
        id: crate::types::ProposalId::new(),
        scope_id,
        role: "planner".into(),
        agent_id,
        actions: vec![Action::AdvanceState { to }],
        created_at: chrono::Utc::now(),
    }
}

/// Human-readable one-line scope summary; not part of the correctness core.
pub fn run_status(scope_name: &str, status: ScopeStatus, goal_score: f64) -> String {
    format!(
        "scope \"{}\" is {:?} (goal score {:.2})",
        scope_name, status, goal_score
    )
}
