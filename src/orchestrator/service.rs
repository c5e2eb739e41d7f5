use std::sync::Arc;

use crate::domain::order::{LifecycleEvent, Order, OrderDraft, ValidationError};
use crate::messaging::{emit_event, BusError, MessageBus, EVENTS_EXCHANGE, ORDER_EXCHANGE};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};

// ============================================================================
// Order Service
// ============================================================================
//
// Single entry point for order creation and lookup. Sole writer of the
// order store and sole publisher to the order exchange. The intake path is
// strictly ordered: validate, persist, publish, then a best-effort
// lifecycle event. If persistence fails nothing is published, so no
// adapter ever sees an order the store does not have.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("order could not be queued: {0}")]
    Publish(#[from] BusError),
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    bus: Arc<dyn MessageBus>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, bus: Arc<dyn MessageBus>, metrics: Arc<Metrics>) -> Self {
        Self { store, bus, metrics }
    }

    /// Declare the exchanges this service publishes to. Idempotent; run
    /// once at startup before accepting requests.
    pub async fn declare_topology(&self) -> Result<(), BusError> {
        self.bus.declare_fanout(ORDER_EXCHANGE).await?;
        self.bus.declare_fanout(EVENTS_EXCHANGE).await?;
        Ok(())
    }

    /// Accept a new order. Deliberately not idempotent: every call mints a
    /// fresh order id; upstream dedup is the caller's concern.
    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order, IntakeError> {
        let order = Order::create(draft).map_err(|error| {
            self.metrics.record_intake_rejected("validation");
            tracing::warn!(%error, "Rejected order submission");
            error
        })?;

        self.store.insert(&order).await.map_err(|error| {
            self.metrics.record_intake_rejected("persistence");
            tracing::error!(order_id = %order.order_id, %error, "Order persistence failed");
            error
        })?;

        let payload = serde_json::to_vec(&order)
            .map_err(|e| BusError::Operation(format!("order serialization failed: {e}")))?;
        self.bus
            .publish(ORDER_EXCHANGE, &payload)
            .await
            .map_err(|error| {
                self.metrics.publish_failures.inc();
                tracing::error!(order_id = %order.order_id, %error, "Order publish failed");
                error
            })?;
        self.metrics.orders_published.inc();

        // Best-effort broadcast; never fails the intake.
        emit_event(self.bus.as_ref(), &LifecycleEvent::order_created(&order)).await;

        self.metrics.orders_created.inc();
        tracing::info!(
            order_id = %order.order_id,
            customer_id = %order.customer_id,
            "Order persisted and published"
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        self.store.get(order_id).await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{
        GeoLocation, IntegrationState, OrderStatus, PackageDetails, Protocol,
    };
    use crate::messaging::{InMemoryBus, Outcome, QueueConsumer};
    use crate::store::InMemoryOrderStore;
    use async_trait::async_trait;

    fn sample_draft() -> OrderDraft {
        OrderDraft {
            customer_id: "CUST-001".into(),
            pickup_location: GeoLocation {
                lat: 6.9271,
                lng: 79.8612,
                address: None,
            },
            delivery_address: GeoLocation {
                lat: 7.2906,
                lng: 80.6337,
                address: None,
            },
            package_details: PackageDetails {
                weight: 2.5,
                dimensions: None,
                fragile: false,
                description: None,
            },
            scheduled_pickup_time: None,
            special_instructions: None,
        }
    }

    async fn service_with_adapter_queues() -> (OrderService, Arc<InMemoryBus>, Arc<InMemoryOrderStore>)
    {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let service = OrderService::new(store.clone(), bus.clone(), Arc::new(Metrics::new().unwrap()));
        service.declare_topology().await.unwrap();
        for protocol in Protocol::ALL {
            bus.declare_queue(&protocol.queue_name()).await.unwrap();
            bus.bind(&protocol.queue_name(), ORDER_EXCHANGE).await.unwrap();
        }
        (service, bus, store)
    }

    #[tokio::test]
    async fn test_scenario_a_create_order() {
        let (service, _bus, _store) = service_with_adapter_queues().await;

        let order = service.create_order(sample_draft()).await.unwrap();

        assert_eq!(order.status, OrderStatus::Received);
        for protocol in Protocol::ALL {
            assert_eq!(
                order.integration_status.get(protocol),
                IntegrationState::Pending
            );
        }
        assert!(order.order_id.starts_with("ORD-"));
    }

    #[tokio::test]
    async fn test_publish_reaches_every_adapter_queue() {
        let (service, bus, _store) = service_with_adapter_queues().await;
        let order = service.create_order(sample_draft()).await.unwrap();

        for protocol in Protocol::ALL {
            let mut consumer = bus.consume(&protocol.queue_name(), 1).await.unwrap();
            let delivery = consumer.next_delivery().await.unwrap();
            let seen: Order = serde_json::from_slice(&delivery.payload).unwrap();
            assert_eq!(seen.order_id, order.order_id);
            consumer.settle(delivery.tag, Outcome::Ack).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_publishes_nothing() {
        let (service, bus, store) = service_with_adapter_queues().await;
        store.set_unavailable(true);

        let result = service.create_order(sample_draft()).await;
        assert!(matches!(result, Err(IntakeError::Persistence(_))));

        for protocol in Protocol::ALL {
            assert_eq!(bus.queue_depth(&protocol.queue_name()), 0);
        }
    }

    #[tokio::test]
    async fn test_publish_success_implies_lookup_succeeds() {
        let (service, _bus, _store) = service_with_adapter_queues().await;
        let order = service.create_order(sample_draft()).await.unwrap();

        let found = service.get_order(&order.order_id).await.unwrap();
        assert_eq!(found.unwrap().order_id, order.order_id);
    }

    #[tokio::test]
    async fn test_validation_failure_persists_nothing() {
        let (service, _bus, store) = service_with_adapter_queues().await;

        let mut draft = sample_draft();
        draft.package_details.weight = 0.0;
        let result = service.create_order(draft).await;

        assert!(matches!(result, Err(IntakeError::Validation(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lifecycle_event_emitted_on_create() {
        let (service, bus, _store) = service_with_adapter_queues().await;
        bus.declare_queue("test_events").await.unwrap();
        bus.bind("test_events", EVENTS_EXCHANGE).await.unwrap();

        let order = service.create_order(sample_draft()).await.unwrap();

        let mut consumer = bus.consume("test_events", 1).await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap();
        let event: LifecycleEvent = serde_json::from_slice(&delivery.payload).unwrap();
        assert_eq!(event.order_id(), Some(order.order_id.as_str()));
    }

    /// Bus whose event-exchange publishes always fail; order publishes work.
    struct EventPublishFailingBus {
        inner: InMemoryBus,
    }

    #[async_trait]
    impl MessageBus for EventPublishFailingBus {
        async fn declare_fanout(&self, exchange: &str) -> Result<(), BusError> {
            self.inner.declare_fanout(exchange).await
        }
        async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
            self.inner.declare_queue(queue).await
        }
        async fn bind(&self, queue: &str, exchange: &str) -> Result<(), BusError> {
            self.inner.bind(queue, exchange).await
        }
        async fn publish(&self, exchange: &str, payload: &[u8]) -> Result<(), BusError> {
            if exchange == EVENTS_EXCHANGE {
                return Err(BusError::Operation("events exchange down".into()));
            }
            self.inner.publish(exchange, payload).await
        }
        async fn consume(
            &self,
            queue: &str,
            prefetch: u16,
        ) -> Result<Box<dyn QueueConsumer>, BusError> {
            self.inner.consume(queue, prefetch).await
        }
    }

    #[tokio::test]
    async fn test_event_publish_failure_is_swallowed() {
        let bus = Arc::new(EventPublishFailingBus {
            inner: InMemoryBus::new(),
        });
        let store = Arc::new(InMemoryOrderStore::new());
        let service = OrderService::new(store, bus.clone(), Arc::new(Metrics::new().unwrap()));
        service.declare_topology().await.unwrap();

        // Event broadcast is best-effort; the order must still be accepted.
        let order = service.create_order(sample_draft()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Received);
    }
}
