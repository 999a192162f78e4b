//! Conclave coordination runtime.
//!
//! The engineering nucleus of a governed multi-agent coordination system: a
//! durable event bus, an epoch-CAS state graph, a policy engine and
//! governance agent, a semantic graph of claims/goals/risks, and the
//! finality/convergence analytics that decide when a scope is done.

pub mod activation;
pub mod agent_loop;
pub mod bus;
pub mod config;
pub mod convergence;
pub mod crypto;
pub mod executor;
pub mod finality;
pub mod governance;
pub mod graph;
pub mod integrations;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod roles;
pub mod secrets;
pub mod store;
pub mod types;
pub mod wal;

pub use bus::{EventBus, InMemoryBus};
pub use governance::{GovernanceAgent, GovernanceMode, GovernanceOutcome};
pub use policy::PolicyEngine;
pub use store::{SqliteStateGraphStore, StateGraphStore};
pub use types::{RuntimeError, RuntimeResult};

use std::sync::Arc;

use crate::graph::SemanticGraph;
use crate::policy::{AuthorizationAdapter, InProcessAuthorizer};

/// The process-wide set of handles every component depends on, built once
/// at startup and passed down explicitly rather than reached for through
/// global state.
pub struct Runtime {
    pub bus: Arc<dyn EventBus>,
    pub state_graph: Arc<dyn StateGraphStore>,
    pub semantic_graph: Arc<SemanticGraph>,
    pub policy: Arc<PolicyEngine>,
    pub authorizer: Arc<dyn AuthorizationAdapter>,
}

impl Runtime {
    /// Builds an all-in-memory runtime suitable for tests and local runs
    /// without a configured on-disk database.
    pub fn in_memory() -> Result<Self, RuntimeError> {
        Ok(Self {
            bus: Arc::new(InMemoryBus::new()),
            state_graph: Arc::new(SqliteStateGraphStore::open_in_memory()?),
            semantic_graph: Arc::new(SemanticGraph::open_in_memory()?),
            policy: Arc::new(PolicyEngine::default_deny()),
            authorizer: Arc::new(InProcessAuthorizer::allow_all_known_actions()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_runtime_builds() {
        Runtime::in_memory().unwrap();
    }
}
