//! Entity Service
//!
//! Merges processed entities into the store in a single unit of work and
//! answers natural-key lookups for the runner.

use harvest_core::domain::entity::{EntityType, ProcessedEntity};
use harvest_core::dto::entity::{EntityFingerprint, MergeSummary};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::repository::entity_repository;

/// Service error type
#[derive(Debug)]
pub enum EntityError {
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for EntityError {
    fn from(err: sqlx::Error) -> Self {
        EntityError::DatabaseError(err)
    }
}

/// Upsert entities by `(type, slug)` in one transaction
///
/// Entities whose stored content hash matches are left untouched. A batch
/// that mentions the same natural key twice keeps the last occurrence.
pub async fn merge_entities(
    pool: &PgPool,
    entities: Vec<ProcessedEntity>,
) -> Result<MergeSummary, EntityError> {
    validate_entities(&entities)?;
    let entities = dedupe_by_key(entities);

    let mut summary = MergeSummary::default();
    if entities.is_empty() {
        return Ok(summary);
    }

    let mut tx = pool.begin().await?;

    for entity in &entities {
        let existing =
            entity_repository::find_hash(&mut *tx, entity.entity_type, &entity.slug).await?;

        match existing {
            Some(hash) if hash == entity.content_hash => summary.unchanged += 1,
            Some(_) => {
                entity_repository::upsert(&mut *tx, entity).await?;
                summary.updated += 1;
            }
            None => {
                entity_repository::upsert(&mut *tx, entity).await?;
                summary.created += 1;
            }
        }
    }

    tx.commit().await?;

    tracing::debug!(
        "Merged {} entities ({} created, {} updated, {} unchanged)",
        summary.total(),
        summary.created,
        summary.updated,
        summary.unchanged
    );

    Ok(summary)
}

/// Fingerprints of the existing entities among `slugs`
pub async fn lookup_entities(
    pool: &PgPool,
    entity_type: EntityType,
    slugs: &[String],
) -> Result<Vec<EntityFingerprint>, EntityError> {
    let mut conn = pool.acquire().await?;
    let fingerprints = entity_repository::find_fingerprints(&mut conn, entity_type, slugs).await?;
    Ok(fingerprints)
}

// =============================================================================
// Validation
// =============================================================================

fn validate_entities(entities: &[ProcessedEntity]) -> Result<(), EntityError> {
    for entity in entities {
        if entity.slug.trim().is_empty() {
            return Err(EntityError::ValidationError(format!(
                "{} entity with empty slug",
                entity.entity_type
            )));
        }
        if entity.slug.len() > 255 {
            return Err(EntityError::ValidationError(format!(
                "slug too long (max 255 characters): {}",
                entity.slug
            )));
        }
    }
    Ok(())
}

fn dedupe_by_key(entities: Vec<ProcessedEntity>) -> Vec<ProcessedEntity> {
    let mut positions: HashMap<(EntityType, String), usize> = HashMap::new();
    let mut unique: Vec<ProcessedEntity> = Vec::with_capacity(entities.len());

    for entity in entities {
        let key = (entity.entity_type, entity.slug.clone());
        match positions.get(&key) {
            Some(&index) => unique[index] = entity,
            None => {
                positions.insert(key, unique.len());
                unique.push(entity);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dedupe_keeps_last_occurrence_in_first_position() {
        let entities = vec![
            ProcessedEntity::new(EntityType::Venue, "hall", json!({"v": 1})),
            ProcessedEntity::new(EntityType::Event, "gig", json!({"v": 1})),
            ProcessedEntity::new(EntityType::Venue, "hall", json!({"v": 2})),
        ];

        let unique = dedupe_by_key(entities);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].slug, "hall");
        assert_eq!(unique[0].data, json!({"v": 2}));
        assert_eq!(unique[1].slug, "gig");
    }

    #[test]
    fn test_same_slug_different_type_is_distinct() {
        let entities = vec![
            ProcessedEntity::new(EntityType::Act, "blue", json!({})),
            ProcessedEntity::new(EntityType::Venue, "blue", json!({})),
        ];
        assert_eq!(dedupe_by_key(entities).len(), 2);
    }

    #[test]
    fn test_empty_slug_rejected() {
        let entities = vec![ProcessedEntity::new(EntityType::Act, " ", json!({}))];
        assert!(matches!(
            validate_entities(&entities),
            Err(EntityError::ValidationError(_))
        ));
    }
}
