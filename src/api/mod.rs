//! HTTP API and WebSocket notification gateway.
//!
//! Routes are nested under `/api/tenants/:tenant_id/...`; the gateway lives at
//! `/ws/tenants/:tenant_id/notifications`. `api_router()` returns a `Router`
//! that can be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;
pub mod websocket;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
