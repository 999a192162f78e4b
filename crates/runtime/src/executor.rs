//! Action executor.
//!
//! Applies an allowed proposal's actions to the state graph and semantic
//! graph. Each action is treated as a single `Final` saga step in the
//! donor's terms: it either lands completely or not at all, and re-running
//! an already-applied `AdvanceState` against a store now at a later epoch
//! is a silent no-op rather than an error, so a retried proposal after a
//! crash doesn't surface a spurious failure.

use thiserror::Error;

use crate::graph::{GraphError, SemanticGraph};
use crate::store::{StateGraphStore, StoreError};
use crate::types::{Action, DecisionRecord, Proposal, ScopeStatus};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("decision does not authorize this proposal")]
    Unauthorized,
}

/// Applies the actions of an allowed proposal, one decision at a time.
pub struct ActionExecutor<'a> {
    state_graph: &'a dyn StateGraphStore,
    semantic_graph: &'a SemanticGraph,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(state_graph: &'a dyn StateGraphStore, semantic_graph: &'a SemanticGraph) -> Self {
        Self {
            state_graph,
            semantic_graph,
        }
    }

    pub async fn apply(
        &self,
        proposal: &Proposal,
        decision: &DecisionRecord,
    ) -> Result<(), ExecutorError> {
        if !decision.binding || decision.decision != crate::types::Decision::Allow {
            return Err(ExecutorError::Unauthorized);
        }

        for action in &proposal.actions {
            self.apply_action(proposal.scope_id, action).await?;
        }
        Ok(())
    }

    async fn apply_action(
        &self,
        scope_id: crate::types::ScopeId,
        action: &Action,
    ) -> Result<(), ExecutorError> {
        match action {
            Action::AdvanceState { to } => self.advance_state(scope_id, *to).await,
            Action::UpsertClaim {
                claim_id,
                subject,
                predicate,
                object,
                confidence,
            } => {
                self.semantic_graph
                    .upsert_claim(scope_id, *claim_id, subject, predicate, object, *confidence)
                    .await?;
                Ok(())
            }
            Action::UpsertGoal {
                goal_id,
                description,
                weight,
            } => {
                self.semantic_graph
                    .upsert_goal(scope_id, *goal_id, description, *weight)
                    .await?;
                Ok(())
            }
            Action::FlagRisk {
                risk_id,
                description,
                severity,
            } => {
                self.semantic_graph
                    .flag_risk(scope_id, *risk_id, description, *severity)
                    .await?;
                Ok(())
            }
            Action::ResolveContradiction {
                claim_a,
                claim_b,
                resolution,
            } => {
                self.semantic_graph
                    .resolve_contradiction(scope_id, *claim_a, *claim_b, resolution)
                    .await?;
                Ok(())
            }
        }
    }

    /// CAS-advance the scope's status, tolerating a concurrent advance that
    /// already landed the same target status (idempotent retry).
    async fn advance_state(
        &self,
        scope_id: crate::types::ScopeId,
        to: ScopeStatus,
    ) -> Result<(), ExecutorError> {
        let scope = self
            .state_graph
            .get(scope_id)
            .await?
            .ok_or(StoreError::ScopeNotFound(scope_id))?;

        if scope.status == to {
            return Ok(());
        }
        if scope.status.is_terminal() {
            return Ok(());
        }

        match self.state_graph.advance(scope_id, scope.epoch, to).await {
            Ok(_) => Ok(()),
            Err(StoreError::EpochConflict { .. }) => {
                let reloaded = self
                    .state_graph
                    .get(scope_id)
                    .await?
                    .ok_or(StoreError::ScopeNotFound(scope_id))?;
                if reloaded.status == to {
                    Ok(())
                } else {
                    Err(StoreError::EpochConflict {
                        scope_id,
                        expected: scope.epoch,
                    }
                    .into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
