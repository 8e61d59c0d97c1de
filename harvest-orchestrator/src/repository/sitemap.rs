//! Sitemap Repository

use harvest_core::domain::schedule::Sitemap;
use harvest_core::dto::schedule::CreateSitemap;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

/// Insert a sitemap for a schedule
pub async fn insert(
    conn: &mut PgConnection,
    schedule_id: Uuid,
    req: CreateSitemap,
) -> Result<Sitemap, sqlx::Error> {
    let sitemap = Sitemap {
        id: Uuid::new_v4(),
        schedule_id,
        url: req.url,
        regex_filter: req.regex_filter,
        is_active: true,
    };

    sqlx::query(
        r#"
        INSERT INTO sitemaps (id, schedule_id, url, regex_filter, is_active)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(sitemap.id)
    .bind(sitemap.schedule_id)
    .bind(&sitemap.url)
    .bind(&sitemap.regex_filter)
    .bind(sitemap.is_active)
    .execute(conn)
    .await?;

    Ok(sitemap)
}

/// Add a sitemap to an existing schedule
pub async fn create(
    pool: &PgPool,
    schedule_id: Uuid,
    req: CreateSitemap,
) -> Result<Sitemap, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    insert(&mut conn, schedule_id, req).await
}

/// All sitemaps of a schedule
pub async fn find_by_schedule(
    pool: &PgPool,
    schedule_id: Uuid,
) -> Result<Vec<Sitemap>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SitemapRow>(
        r#"
        SELECT id, schedule_id, url, regex_filter, is_active
        FROM sitemaps
        WHERE schedule_id = $1
        ORDER BY url ASC
        "#,
    )
    .bind(schedule_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Sitemaps of several schedules, grouped by schedule ID
pub async fn find_by_schedules(
    pool: &PgPool,
    schedule_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Sitemap>>, sqlx::Error> {
    if schedule_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, SitemapRow>(
        r#"
        SELECT id, schedule_id, url, regex_filter, is_active
        FROM sitemaps
        WHERE schedule_id = ANY($1)
        ORDER BY url ASC
        "#,
    )
    .bind(schedule_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<Sitemap>> = HashMap::new();
    for row in rows {
        let sitemap: Sitemap = row.into();
        grouped.entry(sitemap.schedule_id).or_default().push(sitemap);
    }
    Ok(grouped)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct SitemapRow {
    id: Uuid,
    schedule_id: Uuid,
    url: String,
    regex_filter: Option<String>,
    is_active: bool,
}

impl From<SitemapRow> for Sitemap {
    fn from(row: SitemapRow) -> Self {
        Sitemap {
            id: row.id,
            schedule_id: row.schedule_id,
            url: row.url,
            regex_filter: row.regex_filter,
            is_active: row.is_active,
        }
    }
}
