mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub use server::{health_handler, metrics_handler, start_ops_server, ServiceIdentity};

// ============================================================================
// Metrics - Prometheus counters for the order pipeline
// ============================================================================
//
// Covers intake (created/rejected), the publish path, per-adapter delivery
// settlement, backend call latency, and the notification relay. Scraped via
// /metrics on every process.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Intake
    pub orders_created: IntCounter,
    pub intake_rejected: IntCounterVec,

    // Publish path
    pub orders_published: IntCounter,
    pub publish_failures: IntCounter,

    // Adapter consumption
    pub deliveries_settled: IntCounterVec,
    pub backend_call_duration: HistogramVec,

    // Status projection
    pub status_events_applied: IntCounter,

    // Notification relay
    pub events_relayed: IntCounter,
    pub connected_clients: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders accepted at intake")?;
        registry.register(Box::new(orders_created.clone()))?;

        let intake_rejected = IntCounterVec::new(
            Opts::new("intake_rejected_total", "Order submissions rejected at intake"),
            &["reason"],
        )?;
        registry.register(Box::new(intake_rejected.clone()))?;

        let orders_published = IntCounter::new(
            "orders_published_total",
            "Orders published to the order fanout exchange",
        )?;
        registry.register(Box::new(orders_published.clone()))?;

        let publish_failures = IntCounter::new(
            "orders_publish_failures_total",
            "Failed publishes to the order fanout exchange",
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let deliveries_settled = IntCounterVec::new(
            Opts::new("deliveries_settled_total", "Adapter deliveries by settlement outcome"),
            &["adapter", "outcome"],
        )?;
        registry.register(Box::new(deliveries_settled.clone()))?;

        let backend_call_duration = HistogramVec::new(
            HistogramOpts::new("backend_call_duration_seconds", "Backend submission duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["adapter"],
        )?;
        registry.register(Box::new(backend_call_duration.clone()))?;

        let status_events_applied = IntCounter::new(
            "status_events_applied_total",
            "Integration outcomes applied to stored orders",
        )?;
        registry.register(Box::new(status_events_applied.clone()))?;

        let events_relayed = IntCounter::new(
            "events_relayed_total",
            "Lifecycle events rebroadcast to live clients",
        )?;
        registry.register(Box::new(events_relayed.clone()))?;

        let connected_clients = IntGauge::new(
            "connected_clients",
            "Live push-channel client connections",
        )?;
        registry.register(Box::new(connected_clients.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            intake_rejected,
            orders_published,
            publish_failures,
            deliveries_settled,
            backend_call_duration,
            status_events_applied,
            events_relayed,
            connected_clients,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_intake_rejected(&self, reason: &str) {
        self.intake_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_settlement(&self, adapter: &str, outcome: &str) {
        self.deliveries_settled
            .with_label_values(&[adapter, outcome])
            .inc();
    }

    pub fn observe_backend_call(&self, adapter: &str, duration_secs: f64) {
        self.backend_call_duration
            .with_label_values(&[adapter])
            .observe(duration_secs);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
