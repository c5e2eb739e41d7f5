use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

/// Name reported by the liveness endpoint, e.g. "cms-adapter".
#[derive(Clone)]
pub struct ServiceIdentity(pub String);

/// Operational HTTP server for processes that serve nothing else
/// (the adapters): /health and /metrics only.
pub async fn start_ops_server(
    registry: Arc<Registry>,
    service: String,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!(service = %service, port, "Starting ops server");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(ServiceIdentity(service.clone())))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

pub async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(%error, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

pub async fn health_handler(identity: web::Data<ServiceIdentity>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": identity.0,
    }))
}
