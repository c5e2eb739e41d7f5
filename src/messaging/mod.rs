use async_trait::async_trait;

use crate::domain::order::LifecycleEvent;

// ============================================================================
// Messaging - durable fanout bus contract
// ============================================================================
//
// The orchestrator publishes every order to a durable fanout exchange; each
// protocol adapter binds its own durable queue to that exchange and consumes
// with prefetch 1, settling each delivery with an explicit outcome. The
// contract below is what the rest of the crate codes against; `amqp` is the
// production implementation and `memory` the in-process test double.
//
// ============================================================================

mod amqp;
mod memory;

pub use amqp::AmqpBus;
pub use memory::InMemoryBus;

/// Fanout exchange carrying full order payloads.
pub const ORDER_EXCHANGE: &str = "order_exchange";
/// Fanout exchange carrying lifecycle events.
pub const EVENTS_EXCHANGE: &str = "events_exchange";
/// Durable queue the notification relay binds to the events exchange.
pub const NOTIFICATION_QUEUE: &str = "notification_events_queue";

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connection(String),

    #[error("bus operation failed: {0}")]
    Operation(String),

    #[error("queue not declared: {0}")]
    UnknownQueue(String),

    #[error("delivery stream closed")]
    Closed,
}

/// How a consumer settles a delivery. Handlers return this instead of
/// touching bus-library types; the consume loop performs the actual call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Done; remove the message from the queue.
    Ack,
    /// Transient failure; put the message back for redelivery.
    Requeue,
    /// Permanent failure; drop the message without redelivery.
    Reject,
}

/// A message handed to a consumer, awaiting settlement by `tag`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Vec<u8>,
    /// True when the broker has delivered this message before.
    pub redelivered: bool,
    pub tag: u64,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Durable fanout exchange; declaring an existing exchange is a no-op.
    async fn declare_fanout(&self, exchange: &str) -> Result<(), BusError>;

    /// Durable, non-exclusive, non-auto-delete queue.
    async fn declare_queue(&self, queue: &str) -> Result<(), BusError>;

    /// Bind a queue to a fanout exchange (no routing key).
    async fn bind(&self, queue: &str, exchange: &str) -> Result<(), BusError>;

    /// Publish a persistent message; returning `Ok` means the broker has
    /// taken responsibility for it.
    async fn publish(&self, exchange: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Open a consumer on a queue with the given prefetch window.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Box<dyn QueueConsumer>, BusError>;
}

#[async_trait]
pub trait QueueConsumer: Send {
    /// Block until the next delivery is available.
    async fn next_delivery(&mut self) -> Result<Delivery, BusError>;

    /// Settle a previously received delivery.
    async fn settle(&mut self, tag: u64, outcome: Outcome) -> Result<(), BusError>;
}

/// Publish a lifecycle event, best-effort. Event loss must never fail or
/// roll back the operation that produced it, so errors are logged and
/// swallowed here.
pub async fn emit_event(bus: &dyn MessageBus, event: &LifecycleEvent) {
    match serde_json::to_vec(event) {
        Ok(body) => {
            if let Err(error) = bus.publish(EVENTS_EXCHANGE, &body).await {
                tracing::warn!(
                    event_type = ?event.event_type,
                    order_id = event.order_id().unwrap_or("-"),
                    %error,
                    "Dropping lifecycle event, publish failed"
                );
            }
        }
        Err(error) => {
            tracing::warn!(%error, "Dropping lifecycle event, serialization failed");
        }
    }
}
