use async_trait::async_trait;

use crate::domain::order::{Order, Protocol};
use crate::utils::IsTransient;

// ============================================================================
// Protocol Adapters
// ============================================================================
//
// Each adapter consumes its own durable queue bound to the order fanout
// exchange, translates the order into one backend's wire protocol, and
// settles the delivery by outcome. Translation logic lives behind
// `OrderBackend` and never touches bus types; the consume loop in
// `consumer` owns all acking.
//
// ============================================================================

mod cms;
mod consumer;
mod ros;
mod wms;

pub use cms::CmsBackend;
pub use consumer::{AdapterRuntime, RedeliveryPolicy};
pub use ros::RosBackend;
pub use wms::WmsBackend;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Timeout, refused connection, 5xx: worth redelivering.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// The backend explicitly refused the order; redelivery cannot help.
    #[error("backend rejected order: {0}")]
    Rejected(String),
}

impl IsTransient for BackendError {
    fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// One backend's wire protocol. Implementations must be idempotent per
/// order id: the bus delivers at least once, and a redelivered order must
/// not create a duplicate backend record.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn submit(&self, order: &Order) -> Result<(), BackendError>;
}
