//! Execution Repository
//!
//! Handles all database operations related to executions (jobs).

use chrono::{DateTime, Utc};
use harvest_core::domain::execution::{Execution, ExecutionStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Insert a new `Created` execution
pub async fn create(conn: &mut PgConnection, schedule_id: Uuid) -> Result<Execution, sqlx::Error> {
    let execution = Execution {
        id: Uuid::new_v4(),
        schedule_id,
        status: ExecutionStatus::Created,
        started_at: Utc::now(),
        completed_at: None,
        seeded_count: None,
        error_message: None,
    };

    sqlx::query(
        r#"
        INSERT INTO executions (id, schedule_id, status, started_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(execution.id)
    .bind(execution.schedule_id)
    .bind(execution.status.as_str())
    .bind(execution.started_at)
    .execute(conn)
    .await?;

    Ok(execution)
}

/// Find an execution by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Execution>, sqlx::Error> {
    let row = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, schedule_id, status, started_at, completed_at, seeded_count, error_message
        FROM executions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find executions of a schedule, newest first
pub async fn find_by_schedule(
    pool: &PgPool,
    schedule_id: Uuid,
) -> Result<Vec<Execution>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, schedule_id, status, started_at, completed_at, seeded_count, error_message
        FROM executions
        WHERE schedule_id = $1
        ORDER BY started_at DESC
        "#,
    )
    .bind(schedule_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Move an execution to its final status
pub async fn complete(
    conn: &mut PgConnection,
    id: Uuid,
    status: ExecutionStatus,
    seeded_count: Option<i64>,
    error_message: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE executions
        SET status = $1, completed_at = $2, seeded_count = $3, error_message = $4
        WHERE id = $5
        "#,
    )
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(seeded_count)
    .bind(error_message)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    schedule_id: Uuid,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    seeded_count: Option<i64>,
    error_message: Option<String>,
}

impl From<ExecutionRow> for Execution {
    fn from(row: ExecutionRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!("Execution {}: {}", row.id, e);
            ExecutionStatus::Failed
        });

        Execution {
            id: row.id,
            schedule_id: row.schedule_id,
            status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            seeded_count: row.seeded_count,
            error_message: row.error_message,
        }
    }
}
