//! API router.
//!
//! Returns a composable `Router`. REST routes are nested under `/api/`; the
//! notification gateway sits beside them under `/ws/`.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::api::websocket;

/// Build the API router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext) -> Router {
    let patient = Router::new()
        .route("/changes", post(endpoints::changes::submit))
        .route("/assessment", get(endpoints::patients::assessment))
        .route("/assessments", get(endpoints::patients::history))
        .route(
            "/priority",
            put(endpoints::patients::set_priority).delete(endpoints::patients::clear_priority),
        )
        .route("/audit", get(endpoints::patients::audit))
        .route("/rejected", get(endpoints::patients::rejected));

    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/tenants/:tenant_id/queue", get(endpoints::queue::list))
        .nest("/tenants/:tenant_id/patients/:patient_id", patient);

    let ws_routes = Router::new().route(
        "/ws/tenants/:tenant_id/notifications",
        get(websocket::ws_upgrade),
    );

    Router::new()
        .nest("/api", api)
        .merge(ws_routes)
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}
