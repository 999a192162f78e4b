//! Core types shared across the coordination runtime.
//!
//! Identifiers are newtypes over `Uuid` so the compiler catches a `ScopeId`
//! passed where a `ClaimId` is expected. Domain structs here are the wire/
//! storage shapes; behavior lives in the owning module (`bus`, `store`,
//! `graph`, `finality`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub mod error;

pub use error::*;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(AgentId);
uuid_id!(ScopeId);
uuid_id!(ClaimId);
uuid_id!(GoalId);
uuid_id!(RiskId);
uuid_id!(ProposalId);
uuid_id!(ActionId);
uuid_id!(DecisionId);
uuid_id!(ReviewId);
uuid_id!(CertificateId);
uuid_id!(EventId);

/// Monotonically-increasing epoch guarding every state-graph compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn initial() -> Self {
        Self(0)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Case status — the vertices of the scope state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeStatus {
    Active,
    Paused,
    AwaitingHuman,
    Resolved,
    Escalated,
    Blocked,
    Expired,
}

impl ScopeStatus {
    /// Terminal statuses no longer accept new state advances.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScopeStatus::Resolved | ScopeStatus::Escalated | ScopeStatus::Blocked | ScopeStatus::Expired
        )
    }
}

/// Priority levels used by the bus and the agent loop scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

/// A business case being worked by the agent fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub name: String,
    pub status: ScopeStatus,
    pub epoch: Epoch,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl Scope {
    pub fn vacuous(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ScopeId::new(),
            name: name.into(),
            status: ScopeStatus::Active,
            epoch: Epoch::initial(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }
}

/// A streaming context event consumed by role runners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEvent {
    pub id: EventId,
    pub scope_id: ScopeId,
    pub source: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Per-agent working memory keyed by scope, used by the activation filter
/// to decide whether new input is novel enough to justify a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMemory {
    pub last_input_hash: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_idle_cycles: u32,
}

/// A proposal emitted by a role runner, not yet authorized or applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub scope_id: ScopeId,
    pub role: String,
    pub agent_id: AgentId,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
}

/// A single state-advancing or graph-mutating action within a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    AdvanceState {
        to: ScopeStatus,
    },
    UpsertClaim {
        claim_id: ClaimId,
        subject: String,
        predicate: String,
        object: String,
        confidence: f64,
    },
    UpsertGoal {
        goal_id: GoalId,
        description: String,
        weight: f64,
    },
    FlagRisk {
        risk_id: RiskId,
        description: String,
        severity: f64,
    },
    ResolveContradiction {
        claim_a: ClaimId,
        claim_b: ClaimId,
        resolution: String,
    },
}

/// Record of a governance decision over a proposed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: DecisionId,
    pub scope_id: ScopeId,
    pub proposal_id: ProposalId,
    pub policy_version: String,
    pub decision: Decision,
    pub obligations: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub binding: bool,
    pub decided_at: DateTime<Utc>,
}

/// The three-way outcome of a governance evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny { reason: String },
    RequiresApproval { reviewer_role: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_advances_monotonically() {
        let e = Epoch::initial();
        assert_eq!(e.next(), Epoch(1));
        assert!(e.next() > e);
    }

    #[test]
    fn vacuous_scope_is_active() {
        let scope = Scope::vacuous("case-1");
        assert_eq!(scope.status, ScopeStatus::Active);
        assert_eq!(scope.epoch, Epoch::initial());
        assert!(!scope.status.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        assert!(ScopeStatus::Resolved.is_terminal());
        assert!(ScopeStatus::Escalated.is_terminal());
        assert!(ScopeStatus::Blocked.is_terminal());
        assert!(ScopeStatus::Expired.is_terminal());
        assert!(!ScopeStatus::Active.is_terminal());
        assert!(!ScopeStatus::AwaitingHuman.is_terminal());
    }

    #[test]
    fn id_roundtrips_through_string() {
        let id = ScopeId::new();
        let parsed: ScopeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
