//! Schedule Repository
//!
//! Handles all database operations related to schedules. Sitemaps are
//! attached to every schedule returned from here, except by
//! `lock_for_dispatch` which only needs the schedule row.

use chrono::{DateTime, Utc};
use harvest_core::domain::schedule::Schedule;
use harvest_core::dto::schedule::CreateSchedule;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::repository::sitemap_repository;

const SCHEDULE_COLUMNS: &str = "id, source, sku, name, cron_expression, is_active, \
     next_execution, last_executed, created_at";

/// Create a new schedule and its sitemaps in one transaction
pub async fn create(
    pool: &PgPool,
    req: CreateSchedule,
    next_execution: DateTime<Utc>,
) -> Result<Schedule, sqlx::Error> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO schedules (id, source, sku, name, cron_expression, is_active,
                               next_execution, created_at)
        VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7)
        "#,
    )
    .bind(id)
    .bind(&req.source)
    .bind(&req.sku)
    .bind(&req.name)
    .bind(&req.cron_expression)
    .bind(next_execution)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let mut sitemaps = Vec::with_capacity(req.sitemaps.len());
    for sitemap in req.sitemaps {
        sitemaps.push(sitemap_repository::insert(&mut *tx, id, sitemap).await?);
    }

    tx.commit().await?;

    Ok(Schedule {
        id,
        source: req.source,
        sku: req.sku,
        name: req.name,
        cron_expression: req.cron_expression,
        is_active: true,
        next_execution: Some(next_execution),
        last_executed: None,
        created_at: now,
        sitemaps,
    })
}

/// Find a schedule by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Schedule>, sqlx::Error> {
    let row = sqlx::query_as::<_, ScheduleRow>(&format!(
        "SELECT {} FROM schedules WHERE id = $1",
        SCHEDULE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let mut schedule: Schedule = row.into();
            schedule.sitemaps = sitemap_repository::find_by_schedule(pool, id).await?;
            Ok(Some(schedule))
        }
        None => Ok(None),
    }
}

/// List all schedules
pub async fn list_all(pool: &PgPool) -> Result<Vec<Schedule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
        "SELECT {} FROM schedules ORDER BY created_at DESC",
        SCHEDULE_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut sitemaps = sitemap_repository::find_by_schedules(pool, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut schedule: Schedule = row.into();
            schedule.sitemaps = sitemaps.remove(&schedule.id).unwrap_or_default();
            schedule
        })
        .collect())
}

/// The active schedule that has been due the longest, if any
pub async fn find_next_due(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Option<Schedule>, sqlx::Error> {
    let row = sqlx::query_as::<_, ScheduleRow>(&format!(
        r#"
        SELECT {} FROM schedules
        WHERE is_active AND next_execution IS NOT NULL AND next_execution <= $1
        ORDER BY next_execution ASC
        LIMIT 1
        "#,
        SCHEDULE_COLUMNS
    ))
    .bind(now)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let mut schedule: Schedule = row.into();
            schedule.sitemaps = sitemap_repository::find_by_schedule(pool, schedule.id).await?;
            Ok(Some(schedule))
        }
        None => Ok(None),
    }
}

/// Lock a schedule row for the rest of the transaction
///
/// Concurrent dispatchers block here until the holder commits, and then see
/// the advanced `next_execution`.
pub async fn lock_for_dispatch(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Schedule>, sqlx::Error> {
    let row = sqlx::query_as::<_, ScheduleRow>(&format!(
        "SELECT {} FROM schedules WHERE id = $1 FOR UPDATE",
        SCHEDULE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Record a dispatch: set the next occurrence and activity, stamp last execution
pub async fn advance(
    conn: &mut PgConnection,
    id: Uuid,
    next_execution: Option<DateTime<Utc>>,
    is_active: bool,
    executed_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE schedules
        SET next_execution = $1, is_active = $2, last_executed = $3
        WHERE id = $4
        "#,
    )
    .bind(next_execution)
    .bind(is_active)
    .bind(executed_at)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Delete a schedule by ID; its sitemaps go with it
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    source: String,
    sku: String,
    name: String,
    cron_expression: Option<String>,
    is_active: bool,
    next_execution: Option<DateTime<Utc>>,
    last_executed: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ScheduleRow> for Schedule {
    fn from(row: ScheduleRow) -> Self {
        Schedule {
            id: row.id,
            source: row.source,
            sku: row.sku,
            name: row.name,
            cron_expression: row.cron_expression,
            is_active: row.is_active,
            next_execution: row.next_execution,
            last_executed: row.last_executed,
            created_at: row.created_at,
            sitemaps: Vec::new(),
        }
    }
}
