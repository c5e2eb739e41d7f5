use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};

use super::service::{IntakeError, OrderService};
use crate::domain::order::OrderDraft;

// ============================================================================
// Orchestrator HTTP Layer
// ============================================================================
//
// POST /orders        -> 202 Accepted with the created order
// GET  /orders/{id}   -> 200 with the order, or 404
//
// Intake errors map straight onto HTTP: validation is the caller's fault
// (400), an unreachable store or bus is retryable (503).
//
// ============================================================================

impl ResponseError for IntakeError {
    fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::Validation(_) => StatusCode::BAD_REQUEST,
            IntakeError::Persistence(_) | IntakeError::Publish(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}

async fn create_order(
    service: web::Data<OrderService>,
    draft: web::Json<OrderDraft>,
) -> Result<HttpResponse, IntakeError> {
    let order = service.create_order(draft.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(order))
}

async fn get_order(
    service: web::Data<OrderService>,
    order_id: web::Path<String>,
) -> Result<HttpResponse, IntakeError> {
    match service.get_order(&order_id).await? {
        Some(order) => Ok(HttpResponse::Ok().json(order)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "Order not found",
        }))),
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(create_order))
        .route("/orders/{order_id}", web::get().to(get_order));
}

// ============================================================================
// Handler Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryBus;
    use crate::metrics::Metrics;
    use crate::store::InMemoryOrderStore;
    use actix_web::{test, App};
    use std::sync::Arc;

    async fn service_data() -> web::Data<OrderService> {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let service = OrderService::new(store, bus, Arc::new(Metrics::new().unwrap()));
        service.declare_topology().await.unwrap();
        web::Data::new(service)
    }

    macro_rules! test_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(service_data().await)
                    .configure(configure_routes),
            )
            .await
        };
    }

    fn valid_body() -> serde_json::Value {
        serde_json::json!({
            "customerId": "CUST-42",
            "pickupLocation": {"lat": 6.9271, "lng": 79.8612},
            "deliveryAddress": {"lat": 7.2906, "lng": 80.6337},
            "packageDetails": {"weight": 2.5}
        })
    }

    #[actix_web::test]
    async fn test_create_order_returns_202() {
        let app = test_app!();

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/orders")
                .set_json(valid_body())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "RECEIVED");
        assert_eq!(body["customerId"], "CUST-42");
        assert_eq!(body["integrationStatus"]["cms"], "PENDING");
        assert!(body["orderId"].as_str().unwrap().starts_with("ORD-"));
    }

    #[actix_web::test]
    async fn test_out_of_range_latitude_returns_400() {
        let app = test_app!();

        let mut body = valid_body();
        body["pickupLocation"]["lat"] = serde_json::json!(90.0001);
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/orders")
                .set_json(body)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_created_order_is_retrievable() {
        let app = test_app!();

        let created = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/orders")
                .set_json(valid_body())
                .to_request(),
        )
        .await;
        let created: serde_json::Value = test::read_body_json(created).await;
        let order_id = created["orderId"].as_str().unwrap();

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/orders/{order_id}"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["orderId"], order_id);
    }

    #[actix_web::test]
    async fn test_unknown_order_returns_404() {
        let app = test_app!();

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/orders/ORD-0-nope99")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
