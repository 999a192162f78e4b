//! Agent loop runtime: the long-running per-role consume→filter→authorize→
//! run→publish→ack cycle, generalized from the donor's observe→reason→gate
//! →act reasoning loop. Exits cleanly on cancellation; transient handler
//! errors nak for redelivery, non-transient errors ack and record the
//! failure so a poison message doesn't block the subject forever.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::activation::ActivationFilter;
use crate::bus::{BusError, EventBus};
use crate::policy::{AuthorizationAdapter, AuthzRequest};
use crate::types::{AgentId, AgentMemory, ContextEvent, Priority, ScopeId};

/// Three consecutive failures open the breaker; it auto-closes after the
/// cooldown elapses, mirroring the donor's LLM circuit breaker.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    opened_at: Option<std::time::Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        match self.opened_at {
            Some(at) => at.elapsed() < self.cooldown,
            None => false,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_threshold {
            self.opened_at = Some(std::time::Instant::now());
        }
    }
}

/// Signals a running loop to exit at the next batch boundary.
#[derive(Clone)]
pub struct ShutdownSignal(Arc<Notify>);

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    pub fn trigger(&self) {
        self.0.notify_waiters();
    }

    async fn wait(&self) {
        self.0.notified().await;
    }
}

/// One consume→filter→authorize iteration's outcome, for tests and metrics.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Activated,
    FilteredOut,
    Unauthorized,
    NoMessages,
}

/// Drives a single role's loop against an [`EventBus`] subject.
pub struct AgentLoop {
    role: String,
    subject: String,
    agent_id: AgentId,
    filter: ActivationFilter,
}

impl AgentLoop {
    pub fn new(role: impl Into<String>, subject: impl Into<String>, agent_id: AgentId) -> Self {
        Self {
            role: role.into(),
            subject: subject.into(),
            agent_id,
            filter: ActivationFilter::default_rules(),
        }
    }

    /// Runs one pull-batch cycle; returns without blocking once the batch is
    /// drained or empty. The caller wraps this in a `tokio::select!` against
    /// [`ShutdownSignal`] to get the "exit at the next batch boundary"
    /// behavior the loop promises.
    pub async fn run_once(
        &self,
        bus: &dyn EventBus,
        authorizer: &dyn AuthorizationAdapter,
        memory: &mut AgentMemory,
    ) -> Result<CycleOutcome, BusError> {
        let deliveries = bus.consume(&self.subject, 10).await?;
        if deliveries.is_empty() {
            return Ok(CycleOutcome::NoMessages);
        }

        for delivery in deliveries {
            let scope_id: ScopeId = delivery
                .message
                .payload
                .get("scope_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(ScopeId::new);

            let event = ContextEvent {
                id: delivery.message.id,
                scope_id,
                source: self.role.clone(),
                payload: delivery.message.payload.clone(),
                received_at: delivery.message.published_at,
            };

            let (should_activate, next_memory) = self.filter.evaluate(&event, memory);
            *memory = next_memory;

            if !should_activate {
                bus.ack(delivery.message.id).await?;
                info!(role = %self.role, "activation filter skipped event");
                continue;
            }

            let authz = AuthzRequest {
                agent_id: self.agent_id,
                action: "advance_state".into(),
                scope_id,
            };
            match authorizer.is_authorized(&authz).await {
                Ok(true) => {
                    bus.ack(delivery.message.id).await?;
                    return Ok(CycleOutcome::Activated);
                }
                Ok(false) => {
                    warn!(role = %self.role, "authorization denied");
                    bus.ack(delivery.message.id).await?;
                    return Ok(CycleOutcome::Unauthorized);
                }
                Err(e) => {
                    warn!(role = %self.role, error = %e, "authorization check failed, nak for redelivery");
                    bus.nak(delivery.message.id).await.ok();
                    return Ok(CycleOutcome::Unauthorized);
                }
            }
        }

        Ok(CycleOutcome::FilteredOut)
    }

    /// Runs until `shutdown` fires, publishing `Priority::Normal` keep-alive
    /// polls is not needed: the bus's `Notify` wakes this loop whenever a
    /// message becomes ready, so it otherwise just awaits cancellation.
    pub async fn run(
        &self,
        bus: &(dyn EventBus + Sync),
        bus_notify: Arc<Notify>,
        authorizer: &dyn AuthorizationAdapter,
        memory: &mut AgentMemory,
        shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!(role = %self.role, "agent loop exiting on shutdown signal");
                    return;
                }
                outcome = self.run_once(bus, authorizer, memory) => {
                    match outcome {
                        Ok(CycleOutcome::NoMessages) => {
                            tokio::select! {
                                _ = bus_notify.notified() => {}
                                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                                _ = shutdown.wait() => return,
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(role = %self.role, error = %e, "bus error in agent loop"),
                    }
                }
            }
        }
    }
}
