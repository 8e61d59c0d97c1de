//! Job API Handlers
//!
//! HTTP endpoints for executions (jobs).

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use harvest_core::domain::execution::Execution;
use harvest_core::dto::job::{CreateJob, LaunchedJob};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{execution_service, schedule_service};
use crate::state::AppState;

/// POST /job/create
/// Run a schedule now, whether or not it is due
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<LaunchedJob>)> {
    tracing::info!("Launching job for schedule: {}", req.schedule_id);

    let launched = state.dispatcher.launch(req.schedule_id).await?;
    Ok((StatusCode::CREATED, Json(launched)))
}

/// GET /job/{id}
/// Get job details by ID
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Execution>> {
    tracing::debug!("Getting job: {}", id);

    let execution = execution_service::get_execution(&state.pool, id).await?;
    Ok(Json(execution))
}

/// GET /job/schedule/{schedule_id}
/// List all jobs of a schedule, newest first
pub async fn list_jobs_by_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Execution>>> {
    tracing::debug!("Listing jobs for schedule: {}", schedule_id);

    schedule_service::get_schedule(&state.pool, schedule_id).await?;
    let executions =
        execution_service::list_executions_by_schedule(&state.pool, schedule_id).await?;
    Ok(Json(executions))
}
