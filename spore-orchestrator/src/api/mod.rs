//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod health;
pub mod job;
pub mod stream;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::JobRegistry;

/// Create the main API router with all endpoints
pub fn create_router(registry: JobRegistry) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", post(job::submit_job).get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        .route("/jobs/{id}/stream", get(stream::stream_job))
        // Add state and middleware
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
