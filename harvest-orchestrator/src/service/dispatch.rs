//! Dispatcher
//!
//! Background loop that turns due schedules into executions and seeds the
//! collection queue with one pipeline context per sitemap URL. Dispatch
//! pauses while the collection queue is overloaded.

use chrono::Utc;
use harvest_core::domain::context::PipelineContext;
use harvest_core::domain::execution::{Execution, ExecutionStatus};
use harvest_core::domain::schedule::Schedule;
use harvest_core::dto::job::LaunchedJob;
use harvest_queue::{BackPressureManager, QueueClient, QueueError, StageSettings, queues};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::sitemap_repository;
use crate::service::execution::{self as execution_service, ExecutionError};
use crate::service::schedule_service;
use crate::service::sitemap::{SitemapError, SitemapLoader, filter_urls};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("schedule {0} has no active sitemaps")]
    NoActiveSitemaps(Uuid),

    #[error(transparent)]
    Sitemap(#[from] SitemapError),

    #[error("failed to enqueue contexts: {0}")]
    Queue(#[from] QueueError),

    #[error("failed to load sitemaps: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Loop delay, and `max_batch_size` bounds schedules dispatched per iteration
    pub stage: StageSettings,

    /// How far ahead of its next execution a schedule may still be dispatched
    pub stale_tolerance: chrono::Duration,
}

pub struct Dispatcher {
    pool: PgPool,
    queue: QueueClient,
    backpressure: Arc<BackPressureManager>,
    loader: Arc<dyn SitemapLoader>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        queue: QueueClient,
        backpressure: Arc<BackPressureManager>,
        loader: Arc<dyn SitemapLoader>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            pool,
            queue,
            backpressure,
            loader,
            settings,
        }
    }

    /// Runs until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            "Dispatcher started (interval: {:?}, max per iteration: {})",
            self.settings.stage.delay_interval,
            self.settings.stage.max_batch_size
        );

        while !cancel.is_cancelled() {
            match self
                .backpressure
                .should_apply_back_pressure(&queues::collection())
                .await
            {
                Ok(true) => tracing::info!("Collection queue overloaded, holding dispatch"),
                Ok(false) => match self.dispatch_due().await {
                    Ok(0) => tracing::trace!("No schedules due"),
                    Ok(n) => tracing::info!("Dispatched {} schedule(s)", n),
                    Err(e) => tracing::error!("Dispatch iteration failed: {:#}", e),
                },
                Err(e) => tracing::warn!("Queue health unavailable, skipping dispatch: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.stage.delay_interval) => {}
            }
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Dispatches due schedules, at most `max_batch_size` of them
    pub async fn dispatch_due(&self) -> anyhow::Result<usize> {
        let mut dispatched = 0;

        while dispatched < self.settings.stage.max_batch_size {
            let Some(schedule) = schedule_service::get_next_job_for_execution(&self.pool).await?
            else {
                break;
            };

            let execution = match execution_service::create_execution(
                &self.pool,
                schedule.id,
                self.settings.stale_tolerance,
                false,
            )
            .await
            {
                Ok((execution, _)) => execution,
                Err(ExecutionError::StaleSchedule(id)) => {
                    tracing::debug!("Schedule {} already dispatched elsewhere", id);
                    continue;
                }
                Err(ExecutionError::InvalidCron(message)) => {
                    tracing::warn!("Skipping schedule {}: {}", schedule.id, message);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            self.seed(execution, &schedule).await?;
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Creates and seeds an execution right away, whether or not the
    /// schedule is due
    pub async fn launch(&self, schedule_id: Uuid) -> Result<LaunchedJob, ExecutionError> {
        let (execution, schedule) = execution_service::create_execution(
            &self.pool,
            schedule_id,
            self.settings.stale_tolerance,
            true,
        )
        .await?;

        let execution = self.seed(execution, &schedule).await?;
        let seeded = execution.seeded_count.unwrap_or(0) as usize;
        Ok(LaunchedJob { execution, seeded })
    }

    /// Seeds contexts for an execution and records the outcome on it
    async fn seed(
        &self,
        mut execution: Execution,
        schedule: &Schedule,
    ) -> Result<Execution, ExecutionError> {
        let result = match sitemap_repository::find_by_schedule(&self.pool, schedule.id).await {
            Ok(sitemaps) => {
                let schedule = Schedule {
                    sitemaps,
                    ..schedule.clone()
                };
                seed_contexts(&schedule, execution.id, self.loader.as_ref(), &self.queue).await
            }
            Err(e) => Err(SeedError::from(e)),
        };

        execution.completed_at = Some(Utc::now());
        match result {
            Ok(seeded) => {
                execution_service::mark_executed(&self.pool, execution.id, seeded).await?;
                execution.status = ExecutionStatus::Executed;
                execution.seeded_count = Some(seeded as i64);
            }
            Err(e) => {
                let message = e.to_string();
                execution_service::mark_failed(&self.pool, execution.id, &message).await?;
                execution.status = ExecutionStatus::Failed;
                execution.error_message = Some(message);
            }
        }

        Ok(execution)
    }
}

/// Builds one `Pending` context per URL of the schedule's active sitemaps
/// and enqueues them for collection
///
/// Each sitemap's regex filter applies to its own URLs; a URL listed by
/// several sitemaps is seeded once.
pub async fn seed_contexts(
    schedule: &Schedule,
    execution_id: Uuid,
    loader: &dyn SitemapLoader,
    queue: &QueueClient,
) -> Result<usize, SeedError> {
    let sitemaps: Vec<_> = schedule.active_sitemaps().collect();
    if sitemaps.is_empty() {
        return Err(SeedError::NoActiveSitemaps(schedule.id));
    }

    let mut seen = HashSet::new();
    let mut contexts = Vec::new();

    for sitemap in sitemaps {
        let urls = loader.load(&sitemap.url).await?;
        let total = urls.len();
        let urls = filter_urls(urls, sitemap.regex_filter.as_deref())?;
        tracing::debug!(
            "Sitemap {}: {} of {} URLs kept",
            sitemap.url,
            urls.len(),
            total
        );

        for url in urls {
            if seen.insert(url.clone()) {
                contexts.push(
                    PipelineContext::new(execution_id, &schedule.source, &schedule.sku, url)
                        .with_tag("schedule_id", schedule.id.to_string())
                        .with_tag("schedule_name", &schedule.name),
                );
            }
        }
    }

    queue.enqueue_batch(&queues::collection(), &contexts).await?;
    tracing::info!(
        "Seeded {} context(s) for execution {} of schedule {}",
        contexts.len(),
        execution_id,
        schedule.name
    );
    Ok(contexts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harvest_core::domain::context::PipelineState;
    use harvest_core::domain::schedule::Sitemap;
    use harvest_queue::{MemoryQueueStore, QueueHealthMonitor, QueueSettings};
    use std::collections::HashMap;

    struct FakeLoader {
        sitemaps: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl SitemapLoader for FakeLoader {
        async fn load(&self, url: &str) -> Result<Vec<String>, SitemapError> {
            self.sitemaps
                .get(url)
                .cloned()
                .ok_or_else(|| SitemapError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn loader() -> FakeLoader {
        let mut sitemaps = HashMap::new();
        sitemaps.insert(
            "https://example.com/a.xml".to_string(),
            vec![
                "https://example.com/events/1".to_string(),
                "https://example.com/about".to_string(),
                "https://example.com/events/2".to_string(),
            ],
        );
        sitemaps.insert(
            "https://example.com/b.xml".to_string(),
            vec![
                "https://example.com/events/2".to_string(),
                "https://example.com/events/3".to_string(),
            ],
        );
        FakeLoader { sitemaps }
    }

    fn queue() -> QueueClient {
        let store = Arc::new(MemoryQueueStore::new());
        let monitor = Arc::new(QueueHealthMonitor::new(store.clone(), HashMap::new()));
        QueueClient::new(store, QueueSettings::default(), monitor)
    }

    fn schedule(sitemaps: &[(&str, Option<&str>, bool)]) -> Schedule {
        let id = Uuid::new_v4();
        Schedule {
            id,
            source: "example-venue".to_string(),
            sku: "json-ld-events".to_string(),
            name: "events".to_string(),
            cron_expression: None,
            is_active: true,
            next_execution: Some(Utc::now()),
            last_executed: None,
            created_at: Utc::now(),
            sitemaps: sitemaps
                .iter()
                .map(|(url, filter, active)| Sitemap {
                    id: Uuid::new_v4(),
                    schedule_id: id,
                    url: url.to_string(),
                    regex_filter: filter.map(str::to_string),
                    is_active: *active,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_seeds_filtered_unique_urls_as_pending_contexts() {
        let queue = queue();
        let execution_id = Uuid::new_v4();
        let schedule = schedule(&[
            ("https://example.com/a.xml", Some("/events/"), true),
            ("https://example.com/b.xml", None, true),
        ]);

        let seeded = seed_contexts(&schedule, execution_id, &loader(), &queue)
            .await
            .unwrap();
        assert_eq!(seeded, 3);

        let contexts: Vec<PipelineContext> = queue
            .dequeue_batch(&queues::collection(), 10, &CancellationToken::new())
            .await
            .unwrap();
        let urls: Vec<_> = contexts
            .iter()
            .map(|c| c.metadata.collection_url.as_str())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/events/1",
                "https://example.com/events/2",
                "https://example.com/events/3",
            ]
        );
        for context in &contexts {
            assert_eq!(context.state, PipelineState::Pending);
            assert_eq!(context.job_id, execution_id);
            assert_eq!(context.sku_key, "json-ld-events");
            assert_eq!(
                context.metadata.tags.get("schedule_id"),
                Some(&schedule.id.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_inactive_sitemaps_are_skipped() {
        let queue = queue();
        let schedule = schedule(&[
            ("https://example.com/a.xml", None, false),
            ("https://example.com/b.xml", None, true),
        ]);

        let seeded = seed_contexts(&schedule, Uuid::new_v4(), &loader(), &queue)
            .await
            .unwrap();
        assert_eq!(seeded, 2);
    }

    #[tokio::test]
    async fn test_no_active_sitemaps_is_an_error() {
        let queue = queue();
        let schedule = schedule(&[("https://example.com/a.xml", None, false)]);

        let result = seed_contexts(&schedule, Uuid::new_v4(), &loader(), &queue).await;
        assert!(matches!(result, Err(SeedError::NoActiveSitemaps(_))));
    }

    #[tokio::test]
    async fn test_unreachable_sitemap_enqueues_nothing() {
        let queue = queue();
        let schedule = schedule(&[
            ("https://example.com/a.xml", None, true),
            ("https://example.com/missing.xml", None, true),
        ]);

        let result = seed_contexts(&schedule, Uuid::new_v4(), &loader(), &queue).await;
        assert!(matches!(result, Err(SeedError::Sitemap(_))));
        assert_eq!(queue.length(&queues::collection()).await.unwrap(), 0);
    }
}
