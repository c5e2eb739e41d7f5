use async_trait::async_trait;

use crate::domain::order::Order;

// ============================================================================
// Order Store - durable document store, one record per order
// ============================================================================
//
// The orchestrator is the sole writer. The handle is injected into every
// component that needs it, never reached through a module-level singleton,
// so tests substitute the in-memory implementation freely.
//
// ============================================================================

mod memory;

pub use memory::InMemoryOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order store unreachable: {0}")]
    Unavailable(String),

    #[error("order already exists: {0}")]
    Duplicate(String),

    #[error("order not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order record, keyed by its order id.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Replace an existing order record.
    async fn update(&self, order: &Order) -> Result<(), StoreError>;

    /// Point lookup by order id.
    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError>;
}
