use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use super::{BackendError, OrderBackend};
use crate::domain::order::{Order, Protocol};

// ============================================================================
// ROS Backend - cloud route optimization, plain REST
// ============================================================================

pub struct RosBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl RosBackend {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

fn route_request(order: &Order) -> serde_json::Value {
    json!({
        "orderId": order.order_id,
        "customerId": order.customer_id,
        "pickup": {
            "lat": order.pickup_location.lat,
            "lng": order.pickup_location.lng,
        },
        "destination": {
            "lat": order.delivery_address.lat,
            "lng": order.delivery_address.lng,
            "address": order.delivery_address.address,
        },
        "package": {
            "weightKg": order.package_details.weight,
            "fragile": order.package_details.fragile,
        },
        "scheduledPickupTime": order.scheduled_pickup_time,
    })
}

fn classify_status(status: StatusCode, body: &str) -> Result<(), BackendError> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_client_error() {
        return Err(BackendError::Rejected(format!("ROS returned {status}: {body}")));
    }
    Err(BackendError::Transient(format!("ROS returned {status}")))
}

#[async_trait]
impl OrderBackend for RosBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Ros
    }

    async fn submit(&self, order: &Order) -> Result<(), BackendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&route_request(order))
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("ROS unreachable: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{GeoLocation, OrderDraft, PackageDetails};

    fn sample_order() -> Order {
        Order::create(OrderDraft {
            customer_id: "CUST-3".into(),
            pickup_location: GeoLocation {
                lat: 6.9271,
                lng: 79.8612,
                address: None,
            },
            delivery_address: GeoLocation {
                lat: 7.2906,
                lng: 80.6337,
                address: Some("Kandy".into()),
            },
            package_details: PackageDetails {
                weight: 3.0,
                dimensions: None,
                fragile: false,
                description: None,
            },
            scheduled_pickup_time: None,
            special_instructions: None,
        })
        .unwrap()
    }

    #[test]
    fn test_route_request_shape() {
        let order = sample_order();
        let body = route_request(&order);

        assert_eq!(body["orderId"], order.order_id);
        assert_eq!(body["pickup"]["lat"], 6.9271);
        assert_eq!(body["destination"]["address"], "Kandy");
        assert_eq!(body["package"]["weightKg"], 3.0);
    }

    #[test]
    fn test_classify_2xx_ok() {
        assert!(classify_status(StatusCode::CREATED, "").is_ok());
    }

    #[test]
    fn test_classify_4xx_permanent() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "unroutable"),
            Err(BackendError::Rejected(_))
        ));
    }

    #[test]
    fn test_classify_5xx_transient() {
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            Err(BackendError::Transient(_))
        ));
    }
}
