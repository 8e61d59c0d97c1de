//! Dispatch outcomes against a real Postgres
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored` against a
//! scratch database. Sitemaps come from an in-memory loader and contexts land
//! in an in-memory queue.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use harvest_core::domain::context::{PipelineContext, PipelineState};
use harvest_core::domain::execution::ExecutionStatus;
use harvest_core::domain::schedule::Schedule;
use harvest_core::dto::schedule::{CreateSchedule, CreateSitemap};
use harvest_orchestrator::db;
use harvest_orchestrator::repository::execution_repository;
use harvest_orchestrator::service::dispatch::{DispatchSettings, Dispatcher};
use harvest_orchestrator::service::schedule_service;
use harvest_orchestrator::service::sitemap::{SitemapError, SitemapLoader};
use harvest_queue::{
    BackPressureConfig, BackPressureManager, MemoryQueueStore, QueueClient, QueueHealthMonitor,
    QueueSettings, StageSettings, queues,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// `dispatch_due` picks from every due schedule in the database
static DATABASE: Mutex<()> = Mutex::const_new(());

const SITEMAP: &str = "https://venue.example/sitemap.xml";
const MISSING_SITEMAP: &str = "https://venue.example/gone.xml";

struct FixedLoader;

#[async_trait]
impl SitemapLoader for FixedLoader {
    async fn load(&self, url: &str) -> Result<Vec<String>, SitemapError> {
        if url == SITEMAP {
            Ok(vec![
                "https://venue.example/events/1".to_string(),
                "https://venue.example/events/2".to_string(),
                "https://venue.example/events/3".to_string(),
            ])
        } else {
            Err(SitemapError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }
}

async fn pool() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

fn dispatcher(pool: &sqlx::PgPool) -> (Dispatcher, QueueClient) {
    let store = Arc::new(MemoryQueueStore::new());
    let monitor = Arc::new(QueueHealthMonitor::new(store.clone(), HashMap::new()));
    let queue = QueueClient::new(store, QueueSettings::default(), monitor.clone());
    let backpressure = Arc::new(BackPressureManager::new(
        monitor,
        BackPressureConfig::default(),
    ));
    let settings = DispatchSettings {
        stage: StageSettings::default(),
        stale_tolerance: Duration::seconds(30),
    };
    let dispatcher = Dispatcher::new(
        pool.clone(),
        queue.clone(),
        backpressure,
        Arc::new(FixedLoader),
        settings,
    );
    (dispatcher, queue)
}

/// Creates an hourly schedule and makes it due `overdue` ago
async fn due_hourly(pool: &sqlx::PgPool, name: &str, sitemap: &str, overdue: Duration) -> Schedule {
    let skus = vec!["json-ld-events".to_string()];
    let request = CreateSchedule {
        source: "dispatch-test".to_string(),
        sku: "json-ld-events".to_string(),
        name: name.to_string(),
        cron_expression: Some("0 * * * *".to_string()),
        sitemaps: vec![CreateSitemap {
            url: sitemap.to_string(),
            regex_filter: None,
        }],
    };
    let schedule = schedule_service::create_schedule(pool, request, &skus)
        .await
        .unwrap();

    sqlx::query("UPDATE schedules SET next_execution = $1 WHERE id = $2")
        .bind(Utc::now() - overdue)
        .bind(schedule.id)
        .execute(pool)
        .await
        .unwrap();
    schedule
}

async fn seeded_for(queue: &QueueClient, execution_id: Uuid) -> Vec<PipelineContext> {
    let contexts: Vec<PipelineContext> = queue
        .dequeue_batch(&queues::collection(), 100, &CancellationToken::new())
        .await
        .unwrap();
    contexts
        .into_iter()
        .filter(|c| c.job_id == execution_id)
        .collect()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn due_schedule_is_executed_and_seeded() {
    let _guard = DATABASE.lock().await;
    let pool = pool().await;
    let (dispatcher, queue) = dispatcher(&pool);
    let schedule = due_hourly(&pool, "executed", SITEMAP, Duration::minutes(1)).await;

    let dispatched = dispatcher.dispatch_due().await.unwrap();
    assert!(dispatched >= 1);

    let executions = execution_repository::find_by_schedule(&pool, schedule.id)
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Executed);
    assert_eq!(execution.seeded_count, Some(3));
    assert!(execution.completed_at.is_some());

    let contexts = seeded_for(&queue, execution.id).await;
    assert_eq!(contexts.len(), 3);
    assert!(contexts.iter().all(|c| c.state == PipelineState::Pending));

    let schedule_after = schedule_service::get_schedule(&pool, schedule.id)
        .await
        .unwrap();
    assert!(schedule_after.is_active);
    assert!(schedule_after.next_execution > Some(Utc::now()));

    schedule_service::delete_schedule(&pool, schedule.id)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn unreachable_sitemap_fails_the_execution() {
    let _guard = DATABASE.lock().await;
    let pool = pool().await;
    let (dispatcher, queue) = dispatcher(&pool);
    let schedule = due_hourly(&pool, "failed", MISSING_SITEMAP, Duration::minutes(1)).await;

    dispatcher.dispatch_due().await.unwrap();

    let executions = execution_repository::find_by_schedule(&pool, schedule.id)
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.seeded_count, None);
    assert!(
        execution
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("404"))
    );
    assert!(seeded_for(&queue, execution.id).await.is_empty());

    schedule_service::delete_schedule(&pool, schedule.id)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn corrupt_cron_is_retired_without_blocking_other_schedules() {
    let _guard = DATABASE.lock().await;
    let pool = pool().await;
    let (dispatcher, queue) = dispatcher(&pool);

    let broken = due_hourly(&pool, "broken", SITEMAP, Duration::minutes(5)).await;
    sqlx::query("UPDATE schedules SET cron_expression = 'every other tuesday' WHERE id = $1")
        .bind(broken.id)
        .execute(&pool)
        .await
        .unwrap();
    let healthy = due_hourly(&pool, "healthy", SITEMAP, Duration::minutes(1)).await;

    dispatcher.dispatch_due().await.unwrap();

    let broken_after = schedule_service::get_schedule(&pool, broken.id)
        .await
        .unwrap();
    assert!(!broken_after.is_active);
    assert_eq!(broken_after.next_execution, None);

    let broken_runs = execution_repository::find_by_schedule(&pool, broken.id)
        .await
        .unwrap();
    assert_eq!(broken_runs.len(), 1);
    assert_eq!(broken_runs[0].status, ExecutionStatus::Failed);
    assert!(broken_runs[0].error_message.is_some());
    assert!(seeded_for(&queue, broken_runs[0].id).await.is_empty());

    let healthy_runs = execution_repository::find_by_schedule(&pool, healthy.id)
        .await
        .unwrap();
    assert_eq!(healthy_runs.len(), 1);
    assert_eq!(healthy_runs[0].status, ExecutionStatus::Executed);

    for id in [broken.id, healthy.id] {
        schedule_service::delete_schedule(&pool, id).await.unwrap();
    }
}
