//! Queue API Handlers
//!
//! Operational visibility into the pipeline queues.

use axum::{
    Json,
    extract::{Path, State},
};
use harvest_core::domain::queue::QueueHealth;
use harvest_queue::queues;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /queue/{name}/health
pub async fn queue_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<QueueHealth>> {
    if !queues::ALL.contains(&name.as_str()) {
        return Err(ApiError::NotFound(format!(
            "Queue '{}' not found (known: {})",
            name,
            queues::ALL.join(", ")
        )));
    }

    let health = state.monitor.health(&name).await?;
    Ok(Json(health))
}

/// GET /queue/health
/// Health of every pipeline queue, in pipeline order
pub async fn all_queue_health(State(state): State<AppState>) -> ApiResult<Json<Vec<QueueHealth>>> {
    let mut report = Vec::with_capacity(queues::ALL.len());
    for name in queues::ALL {
        report.push(state.monitor.health(name).await?);
    }
    Ok(Json(report))
}
