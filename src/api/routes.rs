//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/status", get(handlers::health::status))
        // Forced resolution cycle
        .route(
            "/probe",
            get(handlers::probe::force_cycle).post(handlers::probe::force_cycle),
        )
        .with_state(state)
}
