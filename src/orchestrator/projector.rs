use std::sync::Arc;

use crate::domain::order::{
    EventType, IntegrationState, LifecycleEvent, OrderStatus, Protocol,
};
use crate::messaging::{emit_event, MessageBus, Outcome, EVENTS_EXCHANGE};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};

// ============================================================================
// Status Projector
// ============================================================================
//
// Applies adapter integration outcomes back onto the stored order, keeping
// the orchestrator the sole store writer. Consumes its own durable queue on
// the events exchange with prefetch 1. Rollup: the first ack moves a
// Received order to Processing, all three acks complete it, any failure
// fails it and broadcasts ORDER_FAILED once.
//
// ============================================================================

/// Durable queue feeding integration outcomes back to the orchestrator.
pub const STATUS_QUEUE: &str = "orchestrator_status_queue";

pub struct StatusProjector {
    store: Arc<dyn OrderStore>,
    bus: Arc<dyn MessageBus>,
    metrics: Arc<Metrics>,
}

impl StatusProjector {
    pub fn new(store: Arc<dyn OrderStore>, bus: Arc<dyn MessageBus>, metrics: Arc<Metrics>) -> Self {
        Self { store, bus, metrics }
    }

    pub async fn declare_topology(&self) -> anyhow::Result<()> {
        self.bus.declare_fanout(EVENTS_EXCHANGE).await?;
        self.bus.declare_queue(STATUS_QUEUE).await?;
        self.bus.bind(STATUS_QUEUE, EVENTS_EXCHANGE).await?;
        Ok(())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        self.declare_topology().await?;
        let mut consumer = self.bus.consume(STATUS_QUEUE, 1).await?;
        tracing::info!(queue = STATUS_QUEUE, "Status projector consuming");

        loop {
            let delivery = consumer.next_delivery().await?;
            let outcome = self.apply(&delivery.payload).await;
            consumer.settle(delivery.tag, outcome).await?;
        }
    }

    /// Decide one delivery's settlement. Only integration outcomes mutate
    /// state; every other event type on the exchange is acked untouched.
    pub(crate) async fn apply(&self, payload: &[u8]) -> Outcome {
        let event: LifecycleEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(%error, "Malformed lifecycle event, rejecting");
                return Outcome::Reject;
            }
        };

        let state = match event.event_type {
            EventType::IntegrationAcked => IntegrationState::Acked,
            EventType::IntegrationFailed => IntegrationState::Failed,
            EventType::OrderCreated | EventType::OrderFailed => return Outcome::Ack,
        };
        let (Some(order_id), Some(protocol)) = (event.order_id(), event.adapter()) else {
            tracing::error!(
                event_type = ?event.event_type,
                "Integration event without order id or adapter, rejecting"
            );
            return Outcome::Reject;
        };

        match self.project(order_id, protocol, state).await {
            Ok(()) => {
                self.metrics.status_events_applied.inc();
                Outcome::Ack
            }
            Err(StoreError::NotFound(order_id)) => {
                // The record vanished between lookup and write; nothing
                // left to project onto.
                tracing::warn!(%order_id, "Order disappeared during projection, dropping event");
                Outcome::Ack
            }
            Err(error) => {
                tracing::warn!(order_id, %error, "Store unavailable, requeueing event");
                Outcome::Requeue
            }
        }
    }

    async fn project(
        &self,
        order_id: &str,
        protocol: Protocol,
        state: IntegrationState,
    ) -> Result<(), StoreError> {
        let Some(mut order) = self.store.get(order_id).await? else {
            tracing::warn!(order_id, "Integration event for unknown order, dropping");
            return Ok(());
        };

        order.record_integration(protocol, state);

        let was_failed = order.status == OrderStatus::Failed;
        if order.integration_status.any_failed() {
            if order.advance(OrderStatus::Failed) && !was_failed {
                emit_event(
                    self.bus.as_ref(),
                    &LifecycleEvent::order_failed(&order.order_id, "backend integration failed"),
                )
                .await;
            }
        } else if order.integration_status.all_acked() {
            order.advance(OrderStatus::Completed);
        } else if order.status == OrderStatus::Received {
            order.advance(OrderStatus::Processing);
        }

        tracing::debug!(
            order_id,
            adapter = %protocol,
            state = ?state,
            status = ?order.status,
            "Applied integration outcome"
        );
        self.store.update(&order).await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
