use std::sync::Arc;

use actix_web::{web, HttpResponse};
use futures_util::stream;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::order::LifecycleEvent;
use crate::messaging::{MessageBus, Outcome, EVENTS_EXCHANGE, NOTIFICATION_QUEUE};
use crate::metrics::Metrics;

// ============================================================================
// Notification Relay
// ============================================================================
//
// Bridges the durable events queue to live, non-durable client
// connections. The relay acks each event as soon as it is handed to the
// broadcast layer: delivery to live clients is at-most-once by design,
// and a client that connects late simply misses earlier events.
//
// ============================================================================

pub struct ClientHub {
    sender: broadcast::Sender<LifecycleEvent>,
    metrics: Arc<Metrics>,
}

impl ClientHub {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, metrics }
    }

    pub fn broadcast(&self, event: LifecycleEvent) -> usize {
        // Err just means nobody is connected right now.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

/// Tracks one live client connection; logs and updates the gauge on both
/// ends of its lifetime.
struct ClientGuard {
    hub: Arc<ClientHub>,
    id: Uuid,
}

impl ClientGuard {
    fn connect(hub: Arc<ClientHub>) -> Self {
        let id = Uuid::new_v4();
        hub.metrics.connected_clients.inc();
        tracing::info!(client_id = %id, "Client connected");
        Self { hub, id }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.hub.metrics.connected_clients.dec();
        tracing::info!(client_id = %self.id, "Client disconnected");
    }
}

pub struct NotificationRelay {
    bus: Arc<dyn MessageBus>,
    hub: Arc<ClientHub>,
    metrics: Arc<Metrics>,
}

impl NotificationRelay {
    pub fn new(bus: Arc<dyn MessageBus>, hub: Arc<ClientHub>, metrics: Arc<Metrics>) -> Self {
        Self { bus, hub, metrics }
    }

    pub async fn declare_topology(&self) -> anyhow::Result<()> {
        self.bus.declare_fanout(EVENTS_EXCHANGE).await?;
        self.bus.declare_queue(NOTIFICATION_QUEUE).await?;
        self.bus.bind(NOTIFICATION_QUEUE, EVENTS_EXCHANGE).await?;
        Ok(())
    }

    /// Decide one delivery's settlement: rebroadcast and ack, or reject a
    /// payload that will never parse.
    pub(crate) fn handle(&self, payload: &[u8]) -> Outcome {
        match serde_json::from_slice::<LifecycleEvent>(payload) {
            Ok(event) => {
                let receivers = self.hub.broadcast(event);
                self.metrics.events_relayed.inc();
                tracing::debug!(receivers, "Relayed lifecycle event");
                Outcome::Ack
            }
            Err(error) => {
                tracing::error!(%error, "Malformed lifecycle event, rejecting");
                Outcome::Reject
            }
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        self.declare_topology().await?;
        let mut consumer = self.bus.consume(NOTIFICATION_QUEUE, 1).await?;
        tracing::info!(queue = NOTIFICATION_QUEUE, "Notification relay consuming");

        loop {
            let delivery = consumer.next_delivery().await?;
            let outcome = self.handle(&delivery.payload);
            consumer.settle(delivery.tag, outcome).await?;
        }
    }
}

// ============================================================================
// SSE push endpoint
// ============================================================================

fn sse_frame(event: &LifecycleEvent) -> Option<web::Bytes> {
    let json = serde_json::to_string(event).ok()?;
    Some(web::Bytes::from(format!("data: {json}\n\n")))
}

pub async fn event_stream(hub: web::Data<Arc<ClientHub>>) -> HttpResponse {
    let guard = ClientGuard::connect(hub.get_ref().clone());
    let receiver = hub.subscribe();

    let body = stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(frame) = sse_frame(&event) {
                        return Some((Ok::<_, std::convert::Infallible>(frame), (receiver, guard)));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(client_id = %guard.id, skipped, "Slow client, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(body)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{EventType, Protocol};
    use crate::messaging::InMemoryBus;
    use std::time::Duration;

    fn hub() -> Arc<ClientHub> {
        Arc::new(ClientHub::new(16, Arc::new(Metrics::new().unwrap())))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let hub = hub();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        let sent = hub.broadcast(LifecycleEvent::integration_acked(Protocol::Cms, "ORD-1-aaaaaa"));
        assert_eq!(sent, 2);

        assert_eq!(
            first.recv().await.unwrap().event_type,
            EventType::IntegrationAcked
        );
        assert_eq!(
            second.recv().await.unwrap().event_type,
            EventType::IntegrationAcked
        );
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_fine() {
        let hub = hub();
        assert_eq!(
            hub.broadcast(LifecycleEvent::order_failed("ORD-1-aaaaaa", "boom")),
            0
        );
    }

    #[tokio::test]
    async fn test_handle_acks_and_rebroadcasts() {
        let hub = hub();
        let relay = NotificationRelay::new(
            Arc::new(InMemoryBus::new()),
            hub.clone(),
            Arc::new(Metrics::new().unwrap()),
        );
        let mut receiver = hub.subscribe();

        let event = LifecycleEvent::integration_failed(Protocol::Wms, "ORD-2-bbbbbb", "rejected");
        let payload = serde_json::to_vec(&event).unwrap();
        assert_eq!(relay.handle(&payload), Outcome::Ack);

        let seen = receiver.recv().await.unwrap();
        assert_eq!(seen.order_id(), Some("ORD-2-bbbbbb"));
    }

    #[tokio::test]
    async fn test_handle_rejects_malformed_event() {
        let relay = NotificationRelay::new(
            Arc::new(InMemoryBus::new()),
            hub(),
            Arc::new(Metrics::new().unwrap()),
        );
        assert_eq!(relay.handle(b"][ not json"), Outcome::Reject);
    }

    #[tokio::test]
    async fn test_relay_drains_events_queue() {
        let bus = Arc::new(InMemoryBus::new());
        let hub = hub();
        let relay = NotificationRelay::new(bus.clone(), hub.clone(), Arc::new(Metrics::new().unwrap()));
        relay.declare_topology().await.unwrap();

        let mut receiver = hub.subscribe();
        let task = tokio::spawn(relay.run());

        let event = LifecycleEvent::integration_acked(Protocol::Ros, "ORD-3-cccccc");
        bus.publish(EVENTS_EXCHANGE, &serde_json::to_vec(&event).unwrap())
            .await
            .unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.order_id(), Some("ORD-3-cccccc"));
        assert_eq!(bus.queue_depth(NOTIFICATION_QUEUE), 0);

        task.abort();
    }

    #[test]
    fn test_sse_frame_format() {
        let event = LifecycleEvent::integration_acked(Protocol::Cms, "ORD-4-dddddd");
        let frame = sse_frame(&event).unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();

        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("INTEGRATION_ACKED"));
    }
}
