//! Entity Repository
//!
//! Entities are keyed by `(entity_type, slug)`; writes are upserts on that
//! natural key.

use chrono::Utc;
use harvest_core::domain::entity::{EntityType, ProcessedEntity};
use harvest_core::dto::entity::EntityFingerprint;
use sqlx::PgConnection;

/// Stored content hash of an entity, if it exists
pub async fn find_hash(
    conn: &mut PgConnection,
    entity_type: EntityType,
    slug: &str,
) -> Result<Option<String>, sqlx::Error> {
    let hash: Option<(String,)> = sqlx::query_as(
        "SELECT content_hash FROM entities WHERE entity_type = $1 AND slug = $2",
    )
    .bind(entity_type.as_str())
    .bind(slug)
    .fetch_optional(conn)
    .await?;

    Ok(hash.map(|(h,)| h))
}

/// Fingerprints of the entities of one type among `slugs`
pub async fn find_fingerprints(
    conn: &mut PgConnection,
    entity_type: EntityType,
    slugs: &[String],
) -> Result<Vec<EntityFingerprint>, sqlx::Error> {
    if slugs.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT slug, content_hash
        FROM entities
        WHERE entity_type = $1 AND slug = ANY($2)
        ORDER BY slug ASC
        "#,
    )
    .bind(entity_type.as_str())
    .bind(slugs)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(slug, content_hash)| EntityFingerprint { slug, content_hash })
        .collect())
}

/// Insert or update an entity by natural key
pub async fn upsert(conn: &mut PgConnection, entity: &ProcessedEntity) -> Result<(), sqlx::Error> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO entities (entity_type, slug, data, content_hash, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (entity_type, slug) DO UPDATE
        SET data = EXCLUDED.data,
            content_hash = EXCLUDED.content_hash,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(entity.entity_type.as_str())
    .bind(&entity.slug)
    .bind(&entity.data)
    .bind(&entity.content_hash)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}
