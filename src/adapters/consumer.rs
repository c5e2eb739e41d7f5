use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{BackendError, OrderBackend};
use crate::domain::order::{LifecycleEvent, Order};
use crate::messaging::{
    emit_event, Delivery, MessageBus, Outcome, EVENTS_EXCHANGE, ORDER_EXCHANGE,
};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Adapter Consume Loop
// ============================================================================
//
// Pull-based: one delivery in flight at a time (prefetch 1), the handler
// computes an Outcome, the loop settles it against the bus. Transient
// backend failures first burn an in-process backoff budget, then go back
// to the broker as a requeue; a per-order redelivery ceiling turns an
// endless requeue cycle into a reject plus a FAILED event, so a sustained
// backend outage cannot become a redelivery storm.
//
// ============================================================================

/// Ceiling on broker redeliveries per order. Thresholds are deployment
/// parameters, not protocol constants.
#[derive(Debug, Clone)]
pub struct RedeliveryPolicy {
    pub max_redeliveries: u32,
    /// Requeue trackers kept before stale entries are pruned.
    pub tracking_capacity: usize,
    /// Age after which an untouched tracker is assumed drained by another
    /// replica.
    pub tracking_ttl: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_redeliveries: 5,
            tracking_capacity: 4096,
            tracking_ttl: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RequeueTracker {
    count: u32,
    touched: Instant,
}

pub struct AdapterRuntime {
    bus: Arc<dyn MessageBus>,
    backend: Arc<dyn OrderBackend>,
    retry: RetryConfig,
    redelivery: RedeliveryPolicy,
    metrics: Arc<Metrics>,
    // Requeue counts per order id, local to this adapter instance.
    requeues: HashMap<String, RequeueTracker>,
}

impl AdapterRuntime {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        backend: Arc<dyn OrderBackend>,
        retry: RetryConfig,
        redelivery: RedeliveryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            bus,
            backend,
            retry,
            redelivery,
            metrics,
            requeues: HashMap::new(),
        }
    }

    /// Declare this adapter's piece of the topology: the shared order
    /// exchange and its own durable queue. Idempotent.
    pub async fn declare_topology(&self) -> anyhow::Result<()> {
        let queue = self.backend.protocol().queue_name();
        self.bus.declare_fanout(ORDER_EXCHANGE).await?;
        self.bus.declare_fanout(EVENTS_EXCHANGE).await?;
        self.bus.declare_queue(&queue).await?;
        self.bus.bind(&queue, ORDER_EXCHANGE).await?;
        Ok(())
    }

    /// Consume until the bus connection is lost. Errors out of this loop
    /// are fatal to the process; external supervision restarts it.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let protocol = self.backend.protocol();
        let queue = protocol.queue_name();
        self.declare_topology().await?;
        let mut consumer = self.bus.consume(&queue, 1).await?;

        tracing::info!(adapter = %protocol, queue = %queue, "Adapter consuming");
        loop {
            let delivery = consumer.next_delivery().await?;
            let outcome = self.process(&delivery).await;
            self.metrics
                .record_settlement(protocol.as_str(), outcome_label(outcome));
            consumer.settle(delivery.tag, outcome).await?;
        }
    }

    /// Handle one delivery and decide its settlement. Never touches the
    /// bus acknowledgment API directly.
    pub(crate) async fn process(&mut self, delivery: &Delivery) -> Outcome {
        let protocol = self.backend.protocol();

        let order: Order = match serde_json::from_slice(&delivery.payload) {
            Ok(order) => order,
            Err(error) => {
                // A payload that never parses would loop forever on requeue.
                tracing::error!(adapter = %protocol, %error, "Malformed order payload, rejecting");
                return Outcome::Reject;
            }
        };

        tracing::info!(adapter = %protocol, order_id = %order.order_id, redelivered = delivery.redelivered, "Processing order");

        let started = Instant::now();
        let result = retry_on_transient(self.retry.clone(), |attempt| {
            let backend = self.backend.clone();
            let order = order.clone();
            async move {
                tracing::debug!(adapter = %backend.protocol(), order_id = %order.order_id, attempt, "Submitting to backend");
                backend.submit(&order).await
            }
        })
        .await;
        self.metrics
            .observe_backend_call(protocol.as_str(), started.elapsed().as_secs_f64());

        match result {
            RetryResult::Success(()) => {
                self.requeues.remove(&order.order_id);
                tracing::info!(adapter = %protocol, order_id = %order.order_id, "Backend accepted order");
                emit_event(
                    self.bus.as_ref(),
                    &LifecycleEvent::integration_acked(protocol, &order.order_id),
                )
                .await;
                Outcome::Ack
            }
            RetryResult::PermanentFailure(error) => {
                self.requeues.remove(&order.order_id);
                tracing::error!(adapter = %protocol, order_id = %order.order_id, %error, "Backend rejected order permanently");
                emit_event(
                    self.bus.as_ref(),
                    &LifecycleEvent::integration_failed(protocol, &order.order_id, &error.to_string()),
                )
                .await;
                Outcome::Reject
            }
            RetryResult::Failed(error) => {
                self.prune_requeue_trackers();
                let now = Instant::now();
                let seen = {
                    let tracker = self
                        .requeues
                        .entry(order.order_id.clone())
                        .or_insert(RequeueTracker {
                            count: 0,
                            touched: now,
                        });
                    tracker.count += 1;
                    tracker.touched = now;
                    tracker.count
                };
                if seen >= self.redelivery.max_redeliveries {
                    self.requeues.remove(&order.order_id);
                    tracing::error!(
                        adapter = %protocol,
                        order_id = %order.order_id,
                        %error,
                        max_redeliveries = self.redelivery.max_redeliveries,
                        "Redelivery ceiling reached, rejecting order"
                    );
                    emit_event(
                        self.bus.as_ref(),
                        &LifecycleEvent::integration_failed(
                            protocol,
                            &order.order_id,
                            "redelivery ceiling reached",
                        ),
                    )
                    .await;
                    Outcome::Reject
                } else {
                    tracing::warn!(
                        adapter = %protocol,
                        order_id = %order.order_id,
                        %error,
                        requeue_count = seen,
                        "Transient backend failure, requeueing for redelivery"
                    );
                    Outcome::Requeue
                }
            }
        }
    }

    /// Drop trackers for orders another replica has since drained, so the
    /// map cannot grow without bound.
    fn prune_requeue_trackers(&mut self) {
        if self.requeues.len() <= self.redelivery.tracking_capacity {
            return;
        }
        let ttl = self.redelivery.tracking_ttl;
        let now = Instant::now();
        let before = self.requeues.len();
        self.requeues
            .retain(|_, tracker| now.duration_since(tracker.touched) < ttl);
        tracing::debug!(
            pruned = before - self.requeues.len(),
            remaining = self.requeues.len(),
            "Pruned stale requeue trackers"
        );
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Ack => "ack",
        Outcome::Requeue => "requeue",
        Outcome::Reject => "reject",
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
