// ============================================================================
// Order Orchestrator - intake, persistence, durable fan-out
// ============================================================================

mod http;
mod projector;
mod service;

pub use http::configure_routes;
pub use projector::StatusProjector;
pub use service::{IntakeError, OrderService};
