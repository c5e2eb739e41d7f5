use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Geographic point with an optional free-text address.
///
/// Field names follow the wire format the gateway and the mock backends
/// already speak (`lat`/`lng`/`address`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl GeoLocation {
    pub fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        if !self.lat.is_finite() || self.lat < -90.0 || self.lat > 90.0 {
            return Err(ValidationError::LatitudeOutOfRange {
                field,
                value: self.lat,
            });
        }
        if !self.lng.is_finite() || self.lng < -180.0 || self.lng > 180.0 {
            return Err(ValidationError::LongitudeOutOfRange {
                field,
                value: self.lng,
            });
        }
        Ok(())
    }
}

/// Package dimensions in centimeters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
    /// Weight in kilograms; must be strictly positive.
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub fragile: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PackageDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(ValidationError::NonPositiveWeight(self.weight));
        }
        Ok(())
    }
}

// ============================================================================
// Backend Integrations
// ============================================================================

/// The three backend protocol families an order fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Cms,
    Ros,
    Wms,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Cms, Protocol::Ros, Protocol::Wms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Cms => "cms",
            Protocol::Ros => "ros",
            Protocol::Wms => "wms",
        }
    }

    /// Durable queue name for this adapter; stable across redeploys so a
    /// restarted adapter reattaches to its backlog.
    pub fn queue_name(&self) -> String {
        format!("{}_order_queue", self.as_str())
    }

    pub fn parse(s: &str) -> Option<Protocol> {
        match s {
            "cms" => Some(Protocol::Cms),
            "ros" => Some(Protocol::Ros),
            "wms" => Some(Protocol::Wms),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationState {
    Pending,
    Acked,
    Failed,
}

/// Per-backend integration outcome. Keys are exactly the three known
/// adapters; each adapter owns writes to its own key only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatus {
    pub cms: IntegrationState,
    pub ros: IntegrationState,
    pub wms: IntegrationState,
}

impl Default for IntegrationStatus {
    fn default() -> Self {
        Self {
            cms: IntegrationState::Pending,
            ros: IntegrationState::Pending,
            wms: IntegrationState::Pending,
        }
    }
}

impl IntegrationStatus {
    pub fn get(&self, protocol: Protocol) -> IntegrationState {
        match protocol {
            Protocol::Cms => self.cms,
            Protocol::Ros => self.ros,
            Protocol::Wms => self.wms,
        }
    }

    pub fn set(&mut self, protocol: Protocol, state: IntegrationState) {
        match protocol {
            Protocol::Cms => self.cms = state,
            Protocol::Ros => self.ros = state,
            Protocol::Wms => self.wms = state,
        }
    }

    pub fn all_acked(&self) -> bool {
        Protocol::ALL
            .iter()
            .all(|p| self.get(*p) == IntegrationState::Acked)
    }

    pub fn any_failed(&self) -> bool {
        Protocol::ALL
            .iter()
            .any(|p| self.get(*p) == IntegrationState::Failed)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
