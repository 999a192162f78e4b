//! Activation filter: decides whether a role runner should actually fire
//! in response to a context event, or whether the event is a duplicate/
//! near-duplicate of what the role already saw.
//!
//! Adapts the donor scheduler's priority-ordered policy-gate rule
//! evaluation from "should this job run" to "should this role fire",
//! plus a SHA-256-over-canonical-JSON dedup hash so repeated identical
//! payloads don't cost a model call.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{AgentMemory, ContextEvent};

/// A rule gating activation, evaluated in order; the first matching rule's
/// verdict is final.
#[derive(Debug, Clone)]
pub enum ActivationRule {
    /// Skip if the input hash matches the last one seen for this agent.
    SkipDuplicateInput,
    /// Skip after `max_idle_cycles` consecutive no-op activations.
    SkipAfterIdle { max_idle_cycles: u32 },
    /// Always activate — the default catch-all.
    AlwaysActivate,
}

/// Canonical SHA-256 hash of a JSON-serializable value, used both for
/// dedup and as a stable fingerprint for observability.
pub fn canonical_hash<T: Serialize>(value: &T) -> String {
    let canonical = serde_json::to_value(value)
        .and_then(|v| serde_json::to_string(&sort_keys(v)))
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: Vec<(String, serde_json::Value)> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// Evaluates a fixed rule chain and returns whether the role runner should
/// activate, along with the updated memory to persist regardless.
pub struct ActivationFilter {
    rules: Vec<ActivationRule>,
}

impl ActivationFilter {
    pub fn new(rules: Vec<ActivationRule>) -> Self {
        Self { rules }
    }

    pub fn default_rules() -> Self {
        Self::new(vec![
            ActivationRule::SkipDuplicateInput,
            ActivationRule::SkipAfterIdle {
                max_idle_cycles: 10,
            },
            ActivationRule::AlwaysActivate,
        ])
    }

    /// Returns `(should_activate, next_memory)`.
    pub fn evaluate(&self, event: &ContextEvent, memory: &AgentMemory) -> (bool, AgentMemory) {
        let hash = canonical_hash(&event.payload);

        for rule in &self.rules {
            match rule {
                ActivationRule::SkipDuplicateInput => {
                    if memory.last_input_hash.as_deref() == Some(hash.as_str()) {
                        let mut next = memory.clone();
                        next.consecutive_idle_cycles += 1;
                        return (false, next);
                    }
                }
                ActivationRule::SkipAfterIdle { max_idle_cycles } => {
                    if memory.consecutive_idle_cycles >= *max_idle_cycles {
                        let mut next = memory.clone();
                        next.consecutive_idle_cycles += 1;
                        return (false, next);
                    }
                }
                ActivationRule::AlwaysActivate => {
                    let next = AgentMemory {
                        last_input_hash: Some(hash),
                        last_run_at: Some(event.received_at),
                        consecutive_idle_cycles: 0,
                    };
                    return (true, next);
                }
            }
        }

        (false, memory.clone())
    }
}
