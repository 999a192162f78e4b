//! Authorization Adapter: a narrow "can this agent perform this action on
//! this scope" relation check, separate from the broader policy engine.
//!
//! Pluggable between an in-process rule table and, behind the `cedar`
//! feature, a Cedar `Authorizer`/`PolicySet` binding — mirroring how the
//! AgentPin integration pluggable-izes credential verification behind a
//! trait with a default and a mock implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AgentId, ScopeId};

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("denied: {0}")]
    Denied(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// The action being checked, as a relation between an agent and a scope.
#[derive(Debug, Clone)]
pub struct AuthzRequest {
    pub agent_id: AgentId,
    pub action: String,
    pub scope_id: ScopeId,
}

#[async_trait]
pub trait AuthorizationAdapter: Send + Sync {
    /// Deny-by-default: an `Err` or a `false` both mean "not authorized".
    async fn is_authorized(&self, request: &AuthzRequest) -> Result<bool, AuthzError>;
}

/// In-process authorizer backed by a static allow-list of (role, action)
/// pairs. Denies anything not explicitly listed.
pub struct InProcessAuthorizer {
    allowed_actions: Vec<String>,
}

impl InProcessAuthorizer {
    pub fn new(allowed_actions: Vec<String>) -> Self {
        Self { allowed_actions }
    }

    pub fn allow_all_known_actions() -> Self {
        Self::new(vec![
            "advance_state".into(),
            "upsert_claim".into(),
            "upsert_goal".into(),
            "flag_risk".into(),
            "resolve_contradiction".into(),
        ])
    }
}

#[async_trait]
impl AuthorizationAdapter for InProcessAuthorizer {
    async fn is_authorized(&self, request: &AuthzRequest) -> Result<bool, AuthzError> {
        Ok(self.allowed_actions.iter().any(|a| a == &request.action))
    }
}

#[cfg(feature = "cedar")]
pub mod cedar_backend {
    use super::*;
    use cedar_policy::{Authorizer, Context, Decision as CedarDecision, Entities, EntityUid, PolicySet, Request};
    use std::str::FromStr;

    /// Cedar-backed authorizer: agents are principals, scopes are
    /// resources, the string action name maps directly to a Cedar action.
    pub struct CedarAuthorizer {
        policies: PolicySet,
        entities: Entities,
        authorizer: Authorizer,
    }

    impl CedarAuthorizer {
        pub fn new(policy_src: &str) -> Result<Self, AuthzError> {
            let policies = PolicySet::from_str(policy_src)
                .map_err(|e| AuthzError::Backend(e.to_string()))?;
            Ok(Self {
                policies,
                entities: Entities::empty(),
                authorizer: Authorizer::new(),
            })
        }

        pub async fn is_authorized_cedar(&self, request: &AuthzRequest) -> Result<bool, AuthzError> {
            let principal = EntityUid::from_str(&format!("Agent::\"{}\"", request.agent_id))
                .map_err(|e| AuthzError::Backend(e.to_string()))?;
            let action = EntityUid::from_str(&format!("Action::\"{}\"", request.action))
                .map_err(|e| AuthzError::Backend(e.to_string()))?;
            let resource = EntityUid::from_str(&format!("Scope::\"{}\"", request.scope_id))
                .map_err(|e| AuthzError::Backend(e.to_string()))?;

            let cedar_request = Request::new(principal, action, resource, Context::empty(), None)
                .map_err(|e| AuthzError::Backend(e.to_string()))?;

            let response = self.authorizer.is_authorized(&cedar_request, &self.policies, &self.entities);
            Ok(response.decision() == CedarDecision::Allow)
        }
    }

    #[async_trait::async_trait]
    impl AuthorizationAdapter for CedarAuthorizer {
        async fn is_authorized(&self, request: &AuthzRequest) -> Result<bool, AuthzError> {
            self.is_authorized_cedar(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_action_is_authorized() {
        let auth = InProcessAuthorizer::allow_all_known_actions();
        let req = AuthzRequest {
            agent_id: AgentId::new(),
            action: "advance_state".into(),
            scope_id: ScopeId::new(),
        };
        assert!(auth.is_authorized(&req).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_action_is_denied_by_default() {
        let auth = InProcessAuthorizer::new(vec!["advance_state".into()]);
        let req = AuthzRequest {
            agent_id: AgentId::new(),
            action: "delete_scope".into(),
            scope_id: ScopeId::new(),
        };
        assert!(!auth.is_authorized(&req).await.unwrap());
    }
}
