//! Schedule Service
//!
//! Business logic for schedule management: validation on create, lookup of
//! the next due schedule for the dispatcher.

use chrono::{DateTime, Utc};
use harvest_core::domain::schedule::{Schedule, Sitemap};
use harvest_core::dto::schedule::{CreateSchedule, CreateSitemap};
use regex::Regex;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{schedule_repository, sitemap_repository};
use crate::service::cron;

/// Service error type
#[derive(Debug)]
pub enum ScheduleError {
    NotFound(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for ScheduleError {
    fn from(err: sqlx::Error) -> Self {
        ScheduleError::DatabaseError(err)
    }
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::NotFound(id) => write!(f, "schedule {} not found", id),
            ScheduleError::ValidationError(msg) => write!(f, "{}", msg),
            ScheduleError::DatabaseError(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Create a new schedule
///
/// Schedules with a cron expression start at its next occurrence; one-shot
/// schedules are due immediately.
pub async fn create_schedule(
    pool: &PgPool,
    req: CreateSchedule,
    known_skus: &[String],
) -> Result<Schedule, ScheduleError> {
    let next_execution = validate_create_request(&req, known_skus, Utc::now())?;

    let schedule = schedule_repository::create(pool, req, next_execution).await?;

    tracing::info!(
        "Schedule created: {} ({}) next execution at {}",
        schedule.name,
        schedule.id,
        next_execution
    );

    Ok(schedule)
}

/// Get a schedule by ID
pub async fn get_schedule(pool: &PgPool, id: Uuid) -> Result<Schedule, ScheduleError> {
    let schedule = schedule_repository::find_by_id(pool, id)
        .await?
        .ok_or(ScheduleError::NotFound(id))?;

    Ok(schedule)
}

/// List all schedules
pub async fn list_schedules(pool: &PgPool) -> Result<Vec<Schedule>, ScheduleError> {
    let schedules = schedule_repository::list_all(pool).await?;
    Ok(schedules)
}

/// Delete a schedule
pub async fn delete_schedule(pool: &PgPool, id: Uuid) -> Result<(), ScheduleError> {
    let deleted = schedule_repository::delete(pool, id).await?;

    if !deleted {
        return Err(ScheduleError::NotFound(id));
    }

    tracing::info!("Schedule deleted: {}", id);
    Ok(())
}

/// Attach another sitemap to a schedule
pub async fn add_sitemap(
    pool: &PgPool,
    schedule_id: Uuid,
    req: CreateSitemap,
) -> Result<Sitemap, ScheduleError> {
    validate_sitemap(&req)?;

    schedule_repository::find_by_id(pool, schedule_id)
        .await?
        .ok_or(ScheduleError::NotFound(schedule_id))?;

    let sitemap = sitemap_repository::create(pool, schedule_id, req).await?;
    tracing::info!("Sitemap {} added to schedule {}", sitemap.url, schedule_id);
    Ok(sitemap)
}

/// The next active schedule whose execution time has passed
pub async fn get_next_job_for_execution(pool: &PgPool) -> Result<Option<Schedule>, ScheduleError> {
    let schedule = schedule_repository::find_next_due(pool, Utc::now()).await?;
    Ok(schedule)
}

// =============================================================================
// Validation
// =============================================================================

/// Validates a create request and returns the first execution time
fn validate_create_request(
    req: &CreateSchedule,
    known_skus: &[String],
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    if req.name.trim().is_empty() {
        return Err(ScheduleError::ValidationError(
            "Schedule name cannot be empty".to_string(),
        ));
    }

    if req.name.len() > 255 {
        return Err(ScheduleError::ValidationError(
            "Schedule name too long (max 255 characters)".to_string(),
        ));
    }

    if req.source.trim().is_empty() {
        return Err(ScheduleError::ValidationError(
            "Schedule source cannot be empty".to_string(),
        ));
    }

    if !known_skus.iter().any(|sku| sku == &req.sku) {
        return Err(ScheduleError::ValidationError(format!(
            "Unknown SKU '{}' (known: {})",
            req.sku,
            known_skus.join(", ")
        )));
    }

    for sitemap in &req.sitemaps {
        validate_sitemap(sitemap)?;
    }

    match &req.cron_expression {
        Some(expression) => cron::next_after(expression, now)
            .map_err(ScheduleError::ValidationError)?
            .ok_or_else(|| {
                ScheduleError::ValidationError(format!(
                    "Cron expression '{}' has no future occurrence",
                    expression
                ))
            }),
        None => Ok(now),
    }
}

fn validate_sitemap(req: &CreateSitemap) -> Result<(), ScheduleError> {
    let url = reqwest::Url::parse(&req.url).map_err(|e| {
        ScheduleError::ValidationError(format!("Invalid sitemap URL '{}': {}", req.url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScheduleError::ValidationError(format!(
            "Sitemap URL must be http or https: {}",
            req.url
        )));
    }

    if let Some(filter) = &req.regex_filter {
        Regex::new(filter).map_err(|e| {
            ScheduleError::ValidationError(format!("Invalid regex filter '{}': {}", filter, e))
        })?;
    }

    Ok(())
}
