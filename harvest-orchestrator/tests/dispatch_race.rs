//! Double-dispatch race against a real Postgres
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored` against a
//! scratch database.

use chrono::Duration;
use harvest_core::dto::schedule::{CreateSchedule, CreateSitemap};
use harvest_orchestrator::db;
use harvest_orchestrator::repository::execution_repository;
use harvest_orchestrator::service::execution::{ExecutionError, create_execution};
use harvest_orchestrator::service::schedule_service;
use tokio::sync::Mutex;

/// Both tests read the earliest due schedule of the whole database
static DATABASE: Mutex<()> = Mutex::const_new(());

async fn pool() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

fn one_shot(name: &str) -> CreateSchedule {
    CreateSchedule {
        source: "race-test".to_string(),
        sku: "json-ld-events".to_string(),
        name: name.to_string(),
        cron_expression: None,
        sitemaps: vec![CreateSitemap {
            url: "https://example.com/sitemap.xml".to_string(),
            regex_filter: None,
        }],
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_dispatch_creates_one_execution() {
    let _guard = DATABASE.lock().await;
    let pool = pool().await;
    let skus = vec!["json-ld-events".to_string()];
    let schedule = schedule_service::create_schedule(&pool, one_shot("race"), &skus)
        .await
        .unwrap();

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                create_execution(&pool, schedule.id, Duration::seconds(30), false).await
            })
        })
        .collect();

    let mut created = 0;
    let mut stale = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => created += 1,
            Err(ExecutionError::StaleSchedule(_)) => stale += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(stale, 7);

    let executions = execution_repository::find_by_schedule(&pool, schedule.id)
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);

    let schedule = schedule_service::get_schedule(&pool, schedule.id)
        .await
        .unwrap();
    assert!(!schedule.is_active);
    assert!(schedule.last_executed.is_some());

    schedule_service::delete_schedule(&pool, schedule.id)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn next_due_schedule_is_earliest_active() {
    let _guard = DATABASE.lock().await;
    let pool = pool().await;
    let skus = vec!["json-ld-events".to_string()];
    let first = schedule_service::create_schedule(&pool, one_shot("first"), &skus)
        .await
        .unwrap();
    let second = schedule_service::create_schedule(&pool, one_shot("second"), &skus)
        .await
        .unwrap();

    let due = schedule_service::get_next_job_for_execution(&pool)
        .await
        .unwrap()
        .unwrap();
    assert!(first.next_execution <= second.next_execution);
    assert_eq!(due.id, first.id);
    assert_eq!(due.sitemaps.len(), 1);

    for id in [first.id, second.id] {
        create_execution(&pool, id, Duration::seconds(30), true)
            .await
            .unwrap();
        schedule_service::delete_schedule(&pool, id).await.unwrap();
    }
}
