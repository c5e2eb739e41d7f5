use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::model::Order;
use super::value_objects::Protocol;

// ============================================================================
// Lifecycle Events
// ============================================================================
//
// Immutable facts broadcast on the events exchange for UI/observability.
// Best-effort only: an event may be dropped without affecting the order
// record, and events are never persisted as queryable entities.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderCreated,
    IntegrationAcked,
    IntegrationFailed,
    OrderFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn order_created(order: &Order) -> Self {
        Self::new(
            EventType::OrderCreated,
            json!({
                "orderId": order.order_id,
                "status": order.status,
                "customerId": order.customer_id,
                "message": "Order received and being processed",
            }),
        )
    }

    pub fn integration_acked(protocol: Protocol, order_id: &str) -> Self {
        Self::new(
            EventType::IntegrationAcked,
            json!({
                "orderId": order_id,
                "adapter": protocol.as_str(),
            }),
        )
    }

    pub fn integration_failed(protocol: Protocol, order_id: &str, reason: &str) -> Self {
        Self::new(
            EventType::IntegrationFailed,
            json!({
                "orderId": order_id,
                "adapter": protocol.as_str(),
                "reason": reason,
            }),
        )
    }

    pub fn order_failed(order_id: &str, reason: &str) -> Self {
        Self::new(
            EventType::OrderFailed,
            json!({
                "orderId": order_id,
                "reason": reason,
            }),
        )
    }

    /// Order id carried in the payload, when present.
    pub fn order_id(&self) -> Option<&str> {
        self.data.get("orderId").and_then(|v| v.as_str())
    }

    /// Adapter named in the payload, when present.
    pub fn adapter(&self) -> Option<Protocol> {
        self.data
            .get("adapter")
            .and_then(|v| v.as_str())
            .and_then(Protocol::parse)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{GeoLocation, OrderDraft, PackageDetails};

    fn sample_order() -> Order {
        Order::create(OrderDraft {
            customer_id: "CUST-1".into(),
            pickup_location: GeoLocation {
                lat: 1.0,
                lng: 2.0,
                address: None,
            },
            delivery_address: GeoLocation {
                lat: 3.0,
                lng: 4.0,
                address: None,
            },
            package_details: PackageDetails {
                weight: 1.0,
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
    fn test_event_wire_format() {
        let order = sample_order();
        let event = LifecycleEvent::order_created(&order);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "ORDER_CREATED");
        assert_eq!(json["data"]["orderId"], order.order_id);
        assert_eq!(json["data"]["status"], "RECEIVED");
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_integration_failed_carries_adapter_and_reason() {
        let event = LifecycleEvent::integration_failed(Protocol::Wms, "ORD-1-abc", "weight rejected");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "INTEGRATION_FAILED");
        assert_eq!(json["data"]["adapter"], "wms");
        assert_eq!(json["data"]["reason"], "weight rejected");
        assert_eq!(event.order_id(), Some("ORD-1-abc"));
        assert_eq!(event.adapter(), Some(Protocol::Wms));
    }

    #[test]
    fn test_event_round_trips() {
        let event = LifecycleEvent::integration_acked(Protocol::Cms, "ORD-2-xyz");
        let bytes = serde_json::to_vec(&event).unwrap();
        let parsed: LifecycleEvent = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed.event_type, EventType::IntegrationAcked);
        assert_eq!(parsed.order_id(), Some("ORD-2-xyz"));
    }
}
