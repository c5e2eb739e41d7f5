use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;
use super::id::new_order_id;
use super::value_objects::{GeoLocation, IntegrationState, IntegrationStatus, PackageDetails, Protocol};

// ============================================================================
// Order Model
// ============================================================================

/// Coarse order lifecycle. Advances monotonically; the only reachable
/// regression target is `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Received,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (_, Failed) => *self != Completed,
            (Received, Processing) | (Received, Completed) => true,
            (Processing, Completed) => true,
            _ => false,
        }
    }
}

/// Intake request as submitted through the gateway. `customerId` comes from
/// the authenticated caller; clients never choose the order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub customer_id: String,
    pub pickup_location: GeoLocation,
    pub delivery_address: GeoLocation,
    pub package_details: PackageDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_pickup_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl OrderDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.customer_id.trim().is_empty() {
            return Err(ValidationError::MissingField("customerId"));
        }
        self.pickup_location.validate("pickupLocation")?;
        self.delivery_address.validate("deliveryAddress")?;
        self.package_details.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub pickup_location: GeoLocation,
    pub delivery_address: GeoLocation,
    pub package_details: PackageDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_pickup_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    pub status: OrderStatus,
    pub integration_status: IntegrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order from a validated draft. Mints the id, stamps the
    /// timestamps, and starts every integration at `Pending`.
    pub fn create(draft: OrderDraft) -> Result<Order, ValidationError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Order {
            order_id: new_order_id(),
            customer_id: draft.customer_id,
            pickup_location: draft.pickup_location,
            delivery_address: draft.delivery_address,
            package_details: draft.package_details,
            scheduled_pickup_time: draft.scheduled_pickup_time,
            special_instructions: draft.special_instructions,
            status: OrderStatus::Received,
            integration_status: IntegrationStatus::default(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn advance(&mut self, next: OrderStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    pub fn record_integration(&mut self, protocol: Protocol, state: IntegrationState) {
        self.integration_status.set(protocol, state);
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
