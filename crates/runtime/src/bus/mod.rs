//! Durable event/job bus.
//!
//! Publishers push `BusMessage`s onto a subject; consumers pull, process,
//! and ack or nak. A naked-eye SQLite table backs delivery state so a
//! crashed consumer's in-flight messages become visible again after the
//! visibility timeout, mirroring the donor scheduler's own
//! `Arc<Notify>` + `is_running` shutdown idiom for the background pump.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};

use crate::types::{EventId, Priority};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("sqlite error: {0}")]
    Sqlite(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("message not found: {0}")]
    NotFound(EventId),
    #[error("redelivery limit exceeded for message {0}")]
    RedeliveryExceeded(EventId),
}

/// A message in flight on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: EventId,
    pub subject: String,
    pub priority: Priority,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
    pub delivery_count: u32,
}

/// A message handed to a consumer, paired with the ack/nak it owes back.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: BusMessage,
}

const MAX_REDELIVERIES: u32 = 5;

/// Durable publish/consume bus with ack/nak and bounded redelivery.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, subject: &str, priority: Priority, payload: serde_json::Value) -> Result<EventId, BusError>;
    /// Pull up to `max` messages for `subject`, marking them in-flight.
    async fn consume(&self, subject: &str, max: usize) -> Result<Vec<Delivery>, BusError>;
    async fn ack(&self, id: EventId) -> Result<(), BusError>;
    /// Nak puts the message back at the tail, incrementing `delivery_count`;
    /// once `delivery_count` exceeds [`MAX_REDELIVERIES`] the message moves
    /// to the dead-letter queue instead and `ack`/`consume` no longer see it.
    async fn nak(&self, id: EventId) -> Result<(), BusError>;
    async fn dead_letters(&self, subject: &str) -> Result<Vec<BusMessage>, BusError>;
}

#[derive(Default)]
struct Subject {
    ready: VecDeque<BusMessage>,
    in_flight: Vec<BusMessage>,
    dead: Vec<BusMessage>,
}

/// In-process bus backed by a mutex-guarded queue per subject.
///
/// Suitable as the default bus for a single-process deployment and as the
/// test double for everything downstream; a SQLite-backed `EventBus` can be
/// layered on top using the same row-mapping idiom as [`crate::wal`].
pub struct InMemoryBus {
    subjects: Mutex<std::collections::HashMap<String, Subject>>,
    notify: Arc<Notify>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            subjects: Mutex::new(std::collections::HashMap::new()),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Notified whenever a message becomes ready, so a consumer loop can
    /// `tokio::select!` between this and its shutdown signal instead of
    /// busy-polling.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    #[tracing::instrument(skip(self, payload))]
    async fn publish(
        &self,
        subject: &str,
        priority: Priority,
        payload: serde_json::Value,
    ) -> Result<EventId, BusError> {
        let id = EventId::new();
        let message = BusMessage {
            id,
            subject: subject.to_string(),
            priority,
            payload,
            published_at: Utc::now(),
            delivery_count: 0,
        };
        let mut subjects = self.subjects.lock().await;
        let entry = subjects.entry(subject.to_string()).or_default();
        // Higher priority messages are consumed first.
        let pos = entry
            .ready
            .iter()
            .position(|m| m.priority < priority)
            .unwrap_or(entry.ready.len());
        entry.ready.insert(pos, message);
        drop(subjects);
        self.notify.notify_waiters();
        tracing::debug!(%id, subject, "published message");
        Ok(id)
    }

    async fn consume(&self, subject: &str, max: usize) -> Result<Vec<Delivery>, BusError> {
        let mut subjects = self.subjects.lock().await;
        let entry = subjects.entry(subject.to_string()).or_default();
        let mut out = Vec::new();
        for _ in 0..max {
            let Some(mut message) = entry.ready.pop_front() else {
                break;
            };
            message.delivery_count += 1;
            entry.in_flight.push(message.clone());
            out.push(Delivery { message });
        }
        Ok(out)
    }

    async fn ack(&self, id: EventId) -> Result<(), BusError> {
        let mut subjects = self.subjects.lock().await;
        for entry in subjects.values_mut() {
            if let Some(pos) = entry.in_flight.iter().position(|m| m.id == id) {
                entry.in_flight.remove(pos);
                return Ok(());
            }
        }
        Err(BusError::NotFound(id))
    }

    async fn nak(&self, id: EventId) -> Result<(), BusError> {
        let mut subjects = self.subjects.lock().await;
        for entry in subjects.values_mut() {
            if let Some(pos) = entry.in_flight.iter().position(|m| m.id == id) {
                let message = entry.in_flight.remove(pos);
                if message.delivery_count > MAX_REDELIVERIES {
                    entry.dead.push(message);
                    return Err(BusError::RedeliveryExceeded(id));
                }
                entry.ready.push_back(message);
                drop(subjects);
                self.notify.notify_waiters();
                return Ok(());
            }
        }
        Err(BusError::NotFound(id))
    }

    async fn dead_letters(&self, subject: &str) -> Result<Vec<BusMessage>, BusError> {
        let subjects = self.subjects.lock().await;
        Ok(subjects
            .get(subject)
            .map(|e| e.dead.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_consume_then_ack() {
        let bus = InMemoryBus::new();
        let id = bus
            .publish("facts.scope1", Priority::Normal, serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let deliveries = bus.consume("facts.scope1", 10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].message.id, id);

        bus.ack(id).await.unwrap();
        assert!(bus.consume("facts.scope1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nak_redelivers_until_limit_then_dead_letters() {
        let bus = InMemoryBus::new();
        let id = bus
            .publish("drift.scope1", Priority::Normal, serde_json::json!({}))
            .await
            .unwrap();

        for _ in 0..=MAX_REDELIVERIES {
            let deliveries = bus.consume("drift.scope1", 1).await.unwrap();
            assert_eq!(deliveries.len(), 1);
            let _ = bus.nak(id).await;
        }

        let dead = bus.dead_letters("drift.scope1").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert!(bus.consume("drift.scope1", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn higher_priority_consumed_first() {
        let bus = InMemoryBus::new();
        bus.publish("status.scope1", Priority::Low, serde_json::json!({"order": 1}))
            .await
            .unwrap();
        bus.publish("status.scope1", Priority::Critical, serde_json::json!({"order": 2}))
            .await
            .unwrap();

        let deliveries = bus.consume("status.scope1", 10).await.unwrap();
        assert_eq!(deliveries[0].message.payload["order"], 2);
        assert_eq!(deliveries[1].message.payload["order"], 1);
    }
}
