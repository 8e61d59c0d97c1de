//! Entity API Handlers
//!
//! Persistence port used by the runner's processing stage.

use axum::{Json, extract::State};
use harvest_core::dto::entity::{EntityFingerprint, LookupEntities, MergeEntities, MergeSummary};

use crate::api::error::ApiResult;
use crate::service::entity_service;
use crate::state::AppState;

/// POST /entities/merge
/// Upsert a batch of entities by natural key in one transaction
pub async fn merge_entities(
    State(state): State<AppState>,
    Json(req): Json<MergeEntities>,
) -> ApiResult<Json<MergeSummary>> {
    tracing::debug!("Merging {} entities", req.entities.len());

    let summary = entity_service::merge_entities(&state.pool, req.entities).await?;
    Ok(Json(summary))
}

/// POST /entities/lookup
/// Fingerprints of existing entities among the given slugs
pub async fn lookup_entities(
    State(state): State<AppState>,
    Json(req): Json<LookupEntities>,
) -> ApiResult<Json<Vec<EntityFingerprint>>> {
    let fingerprints =
        entity_service::lookup_entities(&state.pool, req.entity_type, &req.slugs).await?;
    Ok(Json(fingerprints))
}
