//! Schedule API Handlers
//!
//! HTTP endpoints for schedule management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use harvest_core::domain::schedule::{Schedule, Sitemap};
use harvest_core::dto::schedule::{CreateSchedule, CreateSitemap};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::schedule_service;
use crate::state::AppState;

/// POST /schedule/create
/// Create a new schedule
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateSchedule>,
) -> ApiResult<(StatusCode, Json<Schedule>)> {
    tracing::info!("Creating schedule: {} (sku: {})", req.name, req.sku);

    let schedule =
        schedule_service::create_schedule(&state.pool, req, &state.config.known_skus).await?;

    Ok((StatusCode::CREATED, Json(schedule)))
}

/// GET /schedule/list
/// List all schedules
pub async fn list_schedules(State(state): State<AppState>) -> ApiResult<Json<Vec<Schedule>>> {
    tracing::debug!("Listing all schedules");

    let schedules = schedule_service::list_schedules(&state.pool).await?;
    Ok(Json(schedules))
}

/// GET /schedule/{id}
/// Get a schedule with its sitemaps
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Schedule>> {
    tracing::debug!("Getting schedule: {}", id);

    let schedule = schedule_service::get_schedule(&state.pool, id).await?;
    Ok(Json(schedule))
}

/// DELETE /schedule/{id}
/// Delete a schedule and its sitemaps; its executions are kept
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting schedule: {}", id);

    schedule_service::delete_schedule(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /schedule/{id}/sitemaps
/// Attach a sitemap to a schedule
pub async fn add_sitemap(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateSitemap>,
) -> ApiResult<(StatusCode, Json<Sitemap>)> {
    let sitemap = schedule_service::add_sitemap(&state.pool, id, req).await?;
    Ok((StatusCode::CREATED, Json(sitemap)))
}
