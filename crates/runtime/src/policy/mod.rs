//! Policy Engine and Authorization Adapter.
//!
//! [`engine`] evaluates a proposal's actions against ordered rules to produce
//! an [`crate::types::Decision`]; [`authz`] answers a narrower "is this
//! principal allowed to act on this resource" relation check, pluggable
//! between an in-process evaluator and an optional Cedar binding.

pub mod authz;
pub mod engine;

pub use authz::{AuthorizationAdapter, AuthzError, InProcessAuthorizer};
pub use engine::{PolicyEngine, PolicyError, PolicyRule};
