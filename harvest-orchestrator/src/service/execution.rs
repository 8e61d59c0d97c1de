//! Execution Service
//!
//! Creates executions for due schedules. Creation and the schedule's advance
//! to its next occurrence happen in one transaction holding a row lock on the
//! schedule, so two dispatchers racing on the same due schedule produce a
//! single execution: the loser waits on the lock, then finds the schedule no
//! longer due and gets `StaleSchedule`.

use chrono::{DateTime, Duration, Utc};
use harvest_core::domain::execution::{Execution, ExecutionStatus};
use harvest_core::domain::schedule::Schedule;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{execution_repository, schedule_repository};
use crate::service::cron;

/// Service error type
#[derive(Debug)]
pub enum ExecutionError {
    NotFound(Uuid),
    ScheduleNotFound(Uuid),
    /// The schedule is inactive or not due anymore
    StaleSchedule(Uuid),
    InvalidCron(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for ExecutionError {
    fn from(err: sqlx::Error) -> Self {
        ExecutionError::DatabaseError(err)
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::NotFound(id) => write!(f, "execution {} not found", id),
            ExecutionError::ScheduleNotFound(id) => write!(f, "schedule {} not found", id),
            ExecutionError::StaleSchedule(id) => write!(f, "schedule {} is not due", id),
            ExecutionError::InvalidCron(msg) => write!(f, "{}", msg),
            ExecutionError::DatabaseError(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// How dispatch leaves a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleAdvance {
    pub next_execution: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Create an execution for a schedule and advance the schedule
///
/// Without `force`, the schedule must be active and due within `tolerance`
/// of now. `force` is used for manual triggers and skips the due check, but
/// still advances the schedule.
///
/// A cron expression that no longer parses commits a `Failed` execution and
/// deactivates the schedule before returning `InvalidCron`.
pub async fn create_execution(
    pool: &PgPool,
    schedule_id: Uuid,
    tolerance: Duration,
    force: bool,
) -> Result<(Execution, Schedule), ExecutionError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let schedule = schedule_repository::lock_for_dispatch(&mut *tx, schedule_id)
        .await?
        .ok_or(ExecutionError::ScheduleNotFound(schedule_id))?;

    if !force {
        check_dispatchable(&schedule, now, tolerance)?;
    }

    let advance = match advance_schedule(&schedule, now) {
        Ok(advance) => advance,
        Err(ExecutionError::InvalidCron(message)) => {
            // The schedule can never advance: record the failure and retire it
            let execution = execution_repository::create(&mut *tx, schedule.id).await?;
            execution_repository::complete(
                &mut *tx,
                execution.id,
                ExecutionStatus::Failed,
                None,
                Some(message.as_str()),
            )
            .await?;
            schedule_repository::advance(&mut *tx, schedule.id, None, false, now).await?;
            tx.commit().await?;

            tracing::warn!(
                "Schedule {} deactivated, execution {} failed: {}",
                schedule.id,
                execution.id,
                message
            );
            return Err(ExecutionError::InvalidCron(message));
        }
        Err(e) => return Err(e),
    };
    let execution = execution_repository::create(&mut *tx, schedule.id).await?;
    schedule_repository::advance(
        &mut *tx,
        schedule.id,
        advance.next_execution,
        advance.is_active,
        now,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Execution {} created for schedule {} (next: {:?}, active: {})",
        execution.id,
        schedule.id,
        advance.next_execution,
        advance.is_active
    );

    Ok((execution, schedule))
}

/// Get an execution by ID
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<Execution, ExecutionError> {
    let execution = execution_repository::find_by_id(pool, id)
        .await?
        .ok_or(ExecutionError::NotFound(id))?;

    Ok(execution)
}

/// List executions of a schedule
pub async fn list_executions_by_schedule(
    pool: &PgPool,
    schedule_id: Uuid,
) -> Result<Vec<Execution>, ExecutionError> {
    let executions = execution_repository::find_by_schedule(pool, schedule_id).await?;
    Ok(executions)
}

/// Mark an execution as executed with the number of seeded contexts
pub async fn mark_executed(pool: &PgPool, id: Uuid, seeded: usize) -> Result<(), ExecutionError> {
    let mut conn = pool.acquire().await?;
    execution_repository::complete(
        &mut conn,
        id,
        ExecutionStatus::Executed,
        Some(seeded as i64),
        None,
    )
    .await?;
    tracing::info!("Execution {} executed ({} contexts seeded)", id, seeded);
    Ok(())
}

/// Mark an execution as failed
pub async fn mark_failed(pool: &PgPool, id: Uuid, message: &str) -> Result<(), ExecutionError> {
    let mut conn = pool.acquire().await?;
    execution_repository::complete(&mut conn, id, ExecutionStatus::Failed, None, Some(message))
        .await?;
    tracing::warn!("Execution {} failed: {}", id, message);
    Ok(())
}

// =============================================================================
// Dispatch Rules
// =============================================================================

/// A schedule may be dispatched when active and due within `tolerance`
pub fn check_dispatchable(
    schedule: &Schedule,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> Result<(), ExecutionError> {
    if !schedule.is_active {
        return Err(ExecutionError::StaleSchedule(schedule.id));
    }

    match schedule.next_execution {
        Some(next) if next <= now + tolerance => Ok(()),
        _ => Err(ExecutionError::StaleSchedule(schedule.id)),
    }
}

/// Recurring schedules move to their next occurrence after `now`; one-shot
/// schedules are deactivated
pub fn advance_schedule(
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<ScheduleAdvance, ExecutionError> {
    match &schedule.cron_expression {
        Some(expression) => {
            let next = cron::next_after(expression, now).map_err(ExecutionError::InvalidCron)?;
            Ok(ScheduleAdvance {
                next_execution: next,
                is_active: next.is_some(),
            })
        }
        None => Ok(ScheduleAdvance {
            next_execution: None,
            is_active: false,
        }),
    }
}
