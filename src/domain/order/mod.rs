// ============================================================================
// Order Domain - the unit of work flowing through the middleware
// ============================================================================

mod errors;
mod events;
mod id;
mod model;
mod value_objects;

pub use errors::ValidationError;
pub use events::{EventType, LifecycleEvent};
pub use id::new_order_id;
pub use model::{Order, OrderDraft, OrderStatus};
pub use value_objects::{
    Dimensions, GeoLocation, IntegrationState, IntegrationStatus, PackageDetails, Protocol,
};
