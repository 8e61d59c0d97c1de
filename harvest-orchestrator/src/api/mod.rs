//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod entity;
pub mod error;
pub mod health;
pub mod job;
pub mod queue;
pub mod schedule;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Schedule endpoints
        .route("/schedule/create", post(schedule::create_schedule))
        .route("/schedule/list", get(schedule::list_schedules))
        .route("/schedule/{id}", get(schedule::get_schedule))
        .route("/schedule/{id}", delete(schedule::delete_schedule))
        .route("/schedule/{id}/sitemaps", post(schedule::add_sitemap))
        // Job endpoints
        .route("/job/create", post(job::create_job))
        .route("/job/{id}", get(job::get_job))
        .route(
            "/job/schedule/{schedule_id}",
            get(job::list_jobs_by_schedule),
        )
        // Queue endpoints
        .route("/queue/health", get(queue::all_queue_health))
        .route("/queue/{name}/health", get(queue::queue_health))
        // Entity endpoints
        .route("/entities/merge", post(entity::merge_entities))
        .route("/entities/lookup", post(entity::lookup_entities))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
