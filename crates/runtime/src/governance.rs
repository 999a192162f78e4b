//! Governance agent: consumes proposals, enforces policy plus
//! authorization, and either approves, rejects, or queues a proposal for
//! human review depending on the scope's mode.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::policy::{AuthorizationAdapter, AuthzRequest, PolicyEngine, PolicyError};
use crate::store::{StateGraphStore, StoreError};
use crate::types::{Decision, DecisionRecord, Proposal};

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
}

/// Top-level operating mode for a scope, per the policy file's `mode`
/// section (overridable per scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GovernanceMode {
    /// Auto-approve when policy rules pass.
    Yolo,
    /// Every positive decision queues for human approval.
    Mitl,
    /// Deterministic only; nothing auto-approves.
    Master,
}

/// What the governance agent decided to do with a proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernanceOutcome {
    Approved(DecisionRecord),
    Rejected(DecisionRecord),
    PendingApproval(DecisionRecord),
}

pub struct GovernanceAgent<'a> {
    state_graph: &'a dyn StateGraphStore,
    policy: &'a PolicyEngine,
    authorizer: &'a dyn AuthorizationAdapter,
}

impl<'a> GovernanceAgent<'a> {
    pub fn new(
        state_graph: &'a dyn StateGraphStore,
        policy: &'a PolicyEngine,
        authorizer: &'a dyn AuthorizationAdapter,
    ) -> Self {
        Self {
            state_graph,
            policy,
            authorizer,
        }
    }

    pub async fn evaluate(
        &self,
        proposal: &Proposal,
        mode: GovernanceMode,
        agent_id: crate::types::AgentId,
    ) -> Result<GovernanceOutcome, GovernanceError> {
        let scope = self.state_graph.get(proposal.scope_id).await?;
        if scope.is_none() {
            return Err(StoreError::ScopeNotFound(proposal.scope_id).into());
        }

        if mode == GovernanceMode::Master {
            let record = DecisionRecord {
                id: crate::types::DecisionId::new(),
                scope_id: proposal.scope_id,
                proposal_id: proposal.id,
                policy_version: "master-override".into(),
                decision: Decision::Allow,
                obligations: vec![],
                suggested_actions: vec![],
                binding: true,
                decided_at: chrono::Utc::now(),
            };
            info!(scope_id = %proposal.scope_id, "master mode override");
            return Ok(GovernanceOutcome::Approved(record));
        }

        let mut record = self.policy.evaluate(proposal)?;

        if record.decision != Decision::Allow {
            return Ok(GovernanceOutcome::Rejected(record));
        }

        let authz = AuthzRequest {
            agent_id,
            action: "advance_state".into(),
            scope_id: proposal.scope_id,
        };
        match self.authorizer.is_authorized(&authz).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(scope_id = %proposal.scope_id, "authorization denied");
                record.decision = Decision::Deny {
                    reason: "authorization denied".into(),
                };
                record.binding = true;
                return Ok(GovernanceOutcome::Rejected(record));
            }
            Err(e) => {
                warn!(scope_id = %proposal.scope_id, error = %e, "authorization error, deny by default");
                record.decision = Decision::Deny {
                    reason: format!("authorization error: {e}"),
                };
                record.binding = true;
                return Ok(GovernanceOutcome::Rejected(record));
            }
        }

        if mode == GovernanceMode::Mitl {
            record.binding = false;
            return Ok(GovernanceOutcome::PendingApproval(record));
        }

        Ok(GovernanceOutcome::Approved(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::InProcessAuthorizer;
    use crate::store::SqliteStateGraphStore;
    use crate::types::{Action, AgentId, ProposalId, Scope, ScopeStatus};

    async fn setup() -> (SqliteStateGraphStore, Scope) {
        let store = SqliteStateGraphStore::open_in_memory().unwrap();
        let scope = Scope::vacuous("case-1");
        store.create(scope.clone()).await.unwrap();
        (store, scope)
    }

    #[tokio::test]
    async fn master_mode_always_approves() {
        let (store, scope) = setup().await;
        let policy = PolicyEngine::default_deny();
        let authorizer = InProcessAuthorizer::allow_all_known_actions();
        let agent = GovernanceAgent::new(&store, &policy, &authorizer);

        let proposal = Proposal {
            id: ProposalId::new(),
            scope_id: scope.id,
            role: "planner".into(),
            agent_id: AgentId::new(),
            actions: vec![Action::AdvanceState {
                to: ScopeStatus::Resolved,
            }],
            created_at: chrono::Utc::now(),
        };

        let outcome = agent
            .evaluate(&proposal, GovernanceMode::Master, AgentId::new())
            .await
            .unwrap();
        assert!(matches!(outcome, GovernanceOutcome::Approved(_)));
    }

    #[tokio::test]
    async fn mitl_mode_queues_allowed_proposals() {
        let (store, scope) = setup().await;
        let policy = PolicyEngine::default_deny();
        let authorizer = InProcessAuthorizer::allow_all_known_actions();
        let agent = GovernanceAgent::new(&store, &policy, &authorizer);

        let proposal = Proposal {
            id: ProposalId::new(),
            scope_id: scope.id,
            role: "facts".into(),
            agent_id: AgentId::new(),
            actions: vec![Action::UpsertClaim {
                claim_id: crate::types::ClaimId::new(),
                subject: "s".into(),
                predicate: "p".into(),
                object: "o".into(),
                confidence: 0.8,
            }],
            created_at: chrono::Utc::now(),
        };

        let outcome = agent
            .evaluate(&proposal, GovernanceMode::Mitl, AgentId::new())
            .await
            .unwrap();
        assert!(matches!(outcome, GovernanceOutcome::PendingApproval(_)));
    }

    #[tokio::test]
    async fn yolo_mode_rejects_unauthorized() {
        let (store, scope) = setup().await;
        let policy = PolicyEngine::default_deny();
        let authorizer = InProcessAuthorizer::new(vec![]);
        let agent = GovernanceAgent::new(&store, &policy, &authorizer);

        let proposal = Proposal {
            id: ProposalId::new(),
            scope_id: scope.id,
            role: "facts".into(),
            agent_id: AgentId::new(),
            actions: vec![Action::UpsertClaim {
                claim_id: crate::types::ClaimId::new(),
                subject: "s".into(),
                predicate: "p".into(),
                object: "o".into(),
                confidence: 0.8,
            }],
            created_at: chrono::Utc::now(),
        };

        let outcome = agent
            .evaluate(&proposal, GovernanceMode::Yolo, AgentId::new())
            .await
            .unwrap();
        assert!(matches!(outcome, GovernanceOutcome::Rejected(_)));
    }
}
