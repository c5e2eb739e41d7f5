use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::anyhow;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod adapters;
mod config;
mod domain;
mod messaging;
mod metrics;
mod orchestrator;
mod relay;
mod store;
mod utils;

use adapters::{AdapterRuntime, CmsBackend, OrderBackend, RedeliveryPolicy, RosBackend, WmsBackend};
use config::Config;
use domain::order::Protocol;
use messaging::AmqpBus;
use metrics::{health_handler, metrics_handler, Metrics, ServiceIdentity};
use orchestrator::{OrderService, StatusProjector};
use relay::{ClientHub, NotificationRelay};
use store::{InMemoryOrderStore, OrderStore};
use utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Process entry - one binary, one role per process
// ============================================================================
//
//   swiftlink orchestrator        HTTP intake, persist, publish
//   swiftlink adapter <protocol>  cms | ros | wms
//   swiftlink notifier            lifecycle-event relay with SSE push
//
// Consumers are started here, at process entry, and supervised by the
// process itself: a lost bus connection ends the process with an error so
// external supervision restarts it.
//
// ============================================================================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,swiftlink=debug")),
        )
        .init();

    let config = Config::from_env();
    let role = std::env::args().nth(1).unwrap_or_else(|| "orchestrator".to_string());

    match role.as_str() {
        "orchestrator" => run_orchestrator(config).await,
        "adapter" => {
            let protocol = std::env::args()
                .nth(2)
                .and_then(|name| Protocol::parse(&name))
                .ok_or_else(|| anyhow!("usage: swiftlink adapter <cms|ros|wms>"))?;
            run_adapter(config, protocol).await
        }
        "notifier" => run_notifier(config).await,
        other => Err(anyhow!(
            "unknown role '{other}'; expected orchestrator, adapter <cms|ros|wms>, or notifier"
        )),
    }
}

/// Connect to the broker, with startup backoff so we survive coming up
/// before it does.
async fn connect_bus(url: &str) -> anyhow::Result<Arc<AmqpBus>> {
    match retry_with_backoff(RetryConfig::startup(), |_| AmqpBus::connect(url)).await {
        RetryResult::Success(bus) => Ok(Arc::new(bus)),
        RetryResult::Failed(error) | RetryResult::PermanentFailure(error) => {
            Err(anyhow!("could not reach AMQP broker at {url}: {error}"))
        }
    }
}

async fn run_orchestrator(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting orchestrator");

    let metrics = Arc::new(Metrics::new()?);
    let bus = connect_bus(&config.amqp_url).await?;
    let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());

    let service = OrderService::new(store.clone(), bus.clone(), metrics.clone());
    service.declare_topology().await?;
    let service = web::Data::new(service);
    let registry = Arc::new(metrics.registry().clone());

    let projector = StatusProjector::new(store, bus, metrics.clone());
    let projection = tokio::spawn(projector.run());

    tracing::info!(port = config.http_port, "Orchestrator accepting orders");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(ServiceIdentity("orchestrator".to_string())))
            .configure(orchestrator::configure_routes)
            .route("/health", web::get().to(health_handler))
            .route("/metrics", web::get().to(metrics_handler))
    })
    .bind(("0.0.0.0", config.http_port))?
    .run();

    tokio::select! {
        joined = projection => {
            joined??;
            Err(anyhow!("status projector exited"))
        }
        served = server => {
            served?;
            Err(anyhow!("orchestrator HTTP server exited"))
        }
    }
}

async fn run_adapter(config: Config, protocol: Protocol) -> anyhow::Result<()> {
    tracing::info!(adapter = %protocol, "Starting adapter");

    let metrics = Arc::new(Metrics::new()?);
    let bus = connect_bus(&config.amqp_url).await?;

    let backend: Arc<dyn OrderBackend> = match protocol {
        Protocol::Cms => Arc::new(CmsBackend::new(
            config.cms_endpoint.clone(),
            config.backend_timeout,
        )?),
        Protocol::Ros => Arc::new(RosBackend::new(
            config.ros_endpoint.clone(),
            config.backend_timeout,
        )?),
        Protocol::Wms => Arc::new(WmsBackend::new(config.wms_addr.clone(), config.backend_timeout)),
    };

    let runtime = AdapterRuntime::new(
        bus,
        backend,
        RetryConfig::default(),
        RedeliveryPolicy {
            max_redeliveries: config.max_redeliveries,
            ..RedeliveryPolicy::default()
        },
        metrics.clone(),
    );
    let consumer = tokio::spawn(runtime.run());

    let registry = Arc::new(metrics.registry().clone());
    let service_name = format!("{protocol}-adapter");

    tokio::select! {
        joined = consumer => {
            joined??;
            Err(anyhow!("adapter consumer loop exited"))
        }
        served = metrics::start_ops_server(registry, service_name, config.http_port) => {
            served?;
            Err(anyhow!("ops server exited"))
        }
    }
}

async fn run_notifier(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting notification service");

    let metrics = Arc::new(Metrics::new()?);
    let bus = connect_bus(&config.amqp_url).await?;

    let hub = Arc::new(ClientHub::new(256, metrics.clone()));
    let consumer = tokio::spawn(NotificationRelay::new(bus, hub.clone(), metrics.clone()).run());

    let hub_data = web::Data::new(hub);
    let registry = Arc::new(metrics.registry().clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(hub_data.clone())
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(ServiceIdentity(
                "notification-service".to_string(),
            )))
            .route("/events/stream", web::get().to(relay::event_stream))
            .route("/health", web::get().to(health_handler))
            .route("/metrics", web::get().to(metrics_handler))
    })
    .bind(("0.0.0.0", config.http_port))?
    .run();

    tokio::select! {
        joined = consumer => {
            joined??;
            Err(anyhow!("relay consumer loop exited"))
        }
        served = server => {
            served?;
            Err(anyhow!("notification HTTP server exited"))
        }
    }
}
