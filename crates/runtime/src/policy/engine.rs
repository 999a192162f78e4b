//! Rule-based policy evaluation over proposed actions.
//!
//! Rules are ordered by descending priority and the first match wins,
//! generalizing the donor scheduler's policy gate (which decided whether a
//! job was allowed to run) to deciding whether a proposal's actions are
//! allowed to land on the state graph unattended.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Action, Decision, DecisionId, DecisionRecord, Proposal, ScopeStatus};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("no rule matched and no default decision is configured")]
    NoDefault,
    #[error("invalid rule condition: {0}")]
    InvalidCondition(String),
}

/// A single action-gating condition, matched against a proposal's actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyCondition {
    /// Matches if any action advances state to `to`.
    AdvancesTo { to: ScopeStatus },
    /// Matches if any action is a risk flag with severity >= threshold.
    RiskAtLeast { severity: f64 },
    /// Matches if the proposal's role equals `role`.
    Role { role: String },
    /// Always matches — used for a catch-all default rule.
    Always,
}

impl PolicyCondition {
    fn matches(&self, proposal: &Proposal) -> bool {
        match self {
            PolicyCondition::Always => true,
            PolicyCondition::Role { role } => &proposal.role == role,
            PolicyCondition::AdvancesTo { to } => proposal.actions.iter().any(|a| {
                matches!(a, Action::AdvanceState { to: t } if t == to)
            }),
            PolicyCondition::RiskAtLeast { severity } => proposal.actions.iter().any(|a| {
                matches!(a, Action::FlagRisk { severity: s, .. } if *s >= *severity)
            }),
        }
    }
}

/// What happens to a proposal whose condition matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum PolicyEffect {
    Allow,
    Deny { reason: String },
    RequiresApproval { reviewer_role: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub priority: i32,
    pub condition: PolicyCondition,
    pub effect: PolicyEffect,
    pub obligations: Vec<String>,
}

/// Ordered rule set plus a catch-all default, versioned for audit trails.
pub struct PolicyEngine {
    version: String,
    rules: Vec<PolicyRule>,
}

impl PolicyEngine {
    pub fn new(version: impl Into<String>, mut rules: Vec<PolicyRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            version: version.into(),
            rules,
        }
    }

    /// Default-deny ruleset: resolving a scope always requires human review,
    /// everything else is allowed — a conservative starting point suitable
    /// as a MASTER-mode fallback when no policy file is configured.
    pub fn default_deny() -> Self {
        Self::new(
            "default-v1",
            vec![
                PolicyRule {
                    name: "resolution-requires-approval".into(),
                    priority: 100,
                    condition: PolicyCondition::AdvancesTo {
                        to: ScopeStatus::Resolved,
                    },
                    effect: PolicyEffect::RequiresApproval {
                        reviewer_role: "case-owner".into(),
                        reason: "scope resolution requires human sign-off".into(),
                    },
                    obligations: vec![],
                },
                PolicyRule {
                    name: "high-risk-requires-approval".into(),
                    priority: 90,
                    condition: PolicyCondition::RiskAtLeast { severity: 0.8 },
                    effect: PolicyEffect::RequiresApproval {
                        reviewer_role: "risk-reviewer".into(),
                        reason: "flagged risk severity at or above 0.8".into(),
                    },
                    obligations: vec![],
                },
                PolicyRule {
                    name: "default-allow".into(),
                    priority: i32::MIN,
                    condition: PolicyCondition::Always,
                    effect: PolicyEffect::Allow,
                    obligations: vec![],
                },
            ],
        )
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn evaluate(&self, proposal: &Proposal) -> Result<DecisionRecord, PolicyError> {
        let rule = self
            .rules
            .iter()
            .find(|r| r.condition.matches(proposal))
            .ok_or(PolicyError::NoDefault)?;

        let (decision, binding) = match &rule.effect {
            PolicyEffect::Allow => (Decision::Allow, true),
            PolicyEffect::Deny { reason } => (
                Decision::Deny {
                    reason: reason.clone(),
                },
                true,
            ),
            PolicyEffect::RequiresApproval {
                reviewer_role,
                reason,
            } => (
                Decision::RequiresApproval {
                    reviewer_role: reviewer_role.clone(),
                    reason: reason.clone(),
                },
                false,
            ),
        };

        Ok(DecisionRecord {
            id: DecisionId::new(),
            scope_id: proposal.scope_id,
            proposal_id: proposal.id,
            policy_version: self.version.clone(),
            decision,
            obligations: rule.obligations.clone(),
            suggested_actions: vec![],
            binding,
            decided_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, ProposalId, ScopeId};

    fn proposal(role: &str, actions: Vec<Action>) -> Proposal {
        Proposal {
            id: ProposalId::new(),
            scope_id: ScopeId::new(),
            role: role.to_string(),
            agent_id: AgentId::new(),
            actions,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resolution_requires_approval_by_default() {
        let engine = PolicyEngine::default_deny();
        let p = proposal(
            "planner",
            vec![Action::AdvanceState {
                to: ScopeStatus::Resolved,
            }],
        );
        let decision = engine.evaluate(&p).unwrap();
        assert!(matches!(decision.decision, Decision::RequiresApproval { .. }));
        assert!(!decision.binding);
    }

    #[test]
    fn ordinary_upsert_is_allowed_by_default() {
        let engine = PolicyEngine::default_deny();
        let p = proposal(
            "facts",
            vec![Action::UpsertClaim {
                claim_id: crate::types::ClaimId::new(),
                subject: "s".into(),
                predicate: "p".into(),
                object: "o".into(),
                confidence: 0.9,
            }],
        );
        let decision = engine.evaluate(&p).unwrap();
        assert_eq!(decision.decision, Decision::Allow);
        assert!(decision.binding);
    }

    #[test]
    fn higher_priority_rule_wins_over_catch_all() {
        let engine = PolicyEngine::default_deny();
        let p = proposal(
            "risk",
            vec![Action::FlagRisk {
                risk_id: crate::types::RiskId::new(),
                description: "r".into(),
                severity: 0.95,
            }],
        );
        let decision = engine.evaluate(&p).unwrap();
        assert!(matches!(decision.decision, Decision::RequiresApproval { .. }));
    }
}
