use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{OrderStore, StoreError};
use crate::domain::order::Order;

/// In-memory order store. The default store for tests and local runs; a
/// deployment pointing at an external document store swaps in its own
/// `OrderStore` implementation.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
    unavailable: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection: make every call fail as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::Duplicate(order.order_id.clone()));
        }
        orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.order_id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(order.order_id.clone())),
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        Ok(self.orders.read().await.get(order_id).cloned())
    }
}

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
                weight: 1.5,
                dimensions: None,
                fragile: true,
                description: None,
            },
            scheduled_pickup_time: None,
            special_instructions: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = InMemoryOrderStore::new();
        let order = sample_order();

        store.insert(&order).await.unwrap();
        let found = store.get(&order.order_id).await.unwrap().unwrap();
        assert_eq!(found.order_id, order.order_id);
        assert_eq!(found.customer_id, "CUST-1");
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = InMemoryOrderStore::new();
        assert!(store.get("ORD-0-zzzzzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryOrderStore::new();
        let order = sample_order();

        store.insert(&order).await.unwrap();
        assert!(matches!(
            store.insert(&order).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_replaces_existing_record() {
        let store = InMemoryOrderStore::new();
        let mut order = sample_order();
        store.insert(&order).await.unwrap();

        order.record_integration(
            crate::domain::order::Protocol::Cms,
            crate::domain::order::IntegrationState::Acked,
        );
        store.update(&order).await.unwrap();

        let found = store.get(&order.order_id).await.unwrap().unwrap();
        assert_eq!(
            found.integration_status.cms,
            crate::domain::order::IntegrationState::Acked
        );
    }

    #[tokio::test]
    async fn test_update_missing_order_fails() {
        let store = InMemoryOrderStore::new();
        assert!(matches!(
            store.update(&sample_order()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_all_calls() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true);

        let order = sample_order();
        assert!(matches!(
            store.insert(&order).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.get(&order.order_id).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_unavailable(false);
        assert!(store.insert(&order).await.is_ok());
    }
}
