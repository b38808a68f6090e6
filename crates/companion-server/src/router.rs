//! API router.

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
  Router::new()
    // Health
    .route("/health", get(handlers::health_check))
    // Workflows
    .route("/trigger", post(handlers::trigger))
    .route("/executions", get(handlers::list_executions))
    .route("/execution/:id/status", get(handlers::execution_status))
    .route("/execution/:id/cancel", post(handlers::cancel_execution))
    // Templates
    .route("/templates", get(handlers::list_templates))
    .route("/templates/:id", get(handlers::get_template))
    // Services
    .route("/register", post(handlers::register_service))
    .route("/services", get(handlers::list_services))
    .route(
      "/services/:id",
      put(handlers::update_service).delete(handlers::deregister_service),
    )
    .route("/services/:id/heartbeat", post(handlers::heartbeat))
    .layer(TraceLayer::new_for_http())
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .with_state(state)
}
