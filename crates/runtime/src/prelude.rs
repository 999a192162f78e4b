//! Prelude for building against the coordination runtime.
//!
//! Import the common surface with a single line:
//!
//! ```ignore
//! use conclave_runtime::prelude::*;
//! ```

pub use crate::activation::{ActivationFilter, ActivationRule};
pub use crate::agent_loop::{AgentLoop, CircuitBreaker, ShutdownSignal};
pub use crate::bus::{EventBus, InMemoryBus};
pub use crate::convergence::{ConvergenceStore, ConvergencePoint, DimensionScores, DimensionWeights};
pub use crate::executor::ActionExecutor;
pub use crate::finality::{
    FinalityCondition, FinalityContext, FinalityEvaluator, FinalityOutcome, FinalityReview,
    ReviewOption,
};
pub use crate::governance::{GovernanceAgent, GovernanceMode, GovernanceOutcome};
pub use crate::graph::{FinalitySnapshot, SemanticGraph};
pub use crate::policy::{AuthorizationAdapter, InProcessAuthorizer, PolicyEngine};
pub use crate::store::{SqliteStateGraphStore, StateGraphStore};
pub use crate::types::{
    Action, AgentId, Decision, DecisionRecord, Proposal, Scope, ScopeId, ScopeStatus,
};
pub use crate::{Runtime, RuntimeError, RuntimeResult};
