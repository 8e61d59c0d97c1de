//! Collection stage: `Pending -> Collected`
//!
//! Opens a browser page session per context, hands it to the SKU's
//! collector and stores the returned payload. The session is closed on
//! every path before the outcome is recorded, a panicking collector
//! included.

use async_trait::async_trait;
use futures::FutureExt;
use harvest_core::domain::context::{PipelineContext, PipelineState};
use harvest_queue::{QueueConfig, queues};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{StageProcessor, expect_state};
use crate::adapter::AdapterRegistry;
use crate::browser::WebPageSessionProvider;
use crate::error::StageError;

pub struct CollectionStage {
    registry: Arc<AdapterRegistry>,
    sessions: WebPageSessionProvider,
}

impl CollectionStage {
    pub fn new(registry: Arc<AdapterRegistry>, sessions: WebPageSessionProvider) -> Self {
        Self { registry, sessions }
    }
}

#[async_trait]
impl StageProcessor for CollectionStage {
    fn name(&self) -> &'static str {
        "collection"
    }

    fn input(&self) -> QueueConfig<PipelineContext> {
        queues::collection()
    }

    fn output(&self) -> Option<QueueConfig<PipelineContext>> {
        Some(queues::transformation())
    }

    async fn process(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        expect_state(ctx, PipelineState::Pending, PipelineState::Collected)?;

        let collector = self
            .registry
            .collector(&ctx.sku_key)
            .ok_or_else(|| StageError::UnknownSku(ctx.sku_key.clone()))?;
        let url = ctx.metadata.collection_url.clone();

        let target = url.clone();
        let shutdown = cancel.clone();
        let raw = self
            .sessions
            .with_session(cancel, move |session| {
                async move {
                    tokio::select! {
                        raw = collector.collect(&target, session) => {
                            raw.map_err(StageError::Collection)
                        }
                        _ = shutdown.cancelled() => Err(StageError::Cancelled),
                    }
                }
                .boxed()
            })
            .await?;

        debug!("Collected {} bytes from {}", raw.len(), url);
        ctx.mark_collected(raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Collector, Transformer};
    use crate::browser::pool::tests::{FakeCounters, fake_pool};
    use crate::browser::{BrowserResourceManager, PageSession};
    use crate::config::ContextStrategy;
    use crate::stage::tests::{drain, harness, pending, settings};
    use crate::stage::{IterationOutcome, StageRunner};
    use harvest_core::domain::entity::ProcessedEntity;
    use harvest_queue::BackPressureConfig;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct PageCollector;

    #[async_trait]
    impl Collector for PageCollector {
        async fn collect(&self, url: &str, session: &PageSession) -> anyhow::Result<String> {
            session.fetch_html(url).await
        }
    }

    struct PanickingCollector;

    #[async_trait]
    impl Collector for PanickingCollector {
        async fn collect(&self, url: &str, session: &PageSession) -> anyhow::Result<String> {
            session.page().goto(url, Duration::from_secs(1)).await?;
            panic!("selector table missing for {}", url);
        }
    }

    struct NoopTransformer;

    #[async_trait]
    impl Transformer for NoopTransformer {
        async fn transform(&self, _raw: &str) -> anyhow::Result<Vec<ProcessedEntity>> {
            Ok(Vec::new())
        }
    }

    fn stage(
        html: &str,
        browsers: usize,
        contexts: usize,
    ) -> (
        Arc<CollectionStage>,
        Arc<BrowserResourceManager>,
        Arc<FakeCounters>,
    ) {
        let (pool, counters) = fake_pool(browsers, contexts, ContextStrategy::Recycle, html);
        let mut registry = AdapterRegistry::new();
        registry.register("pages", Arc::new(PageCollector), Arc::new(NoopTransformer));
        let sessions = WebPageSessionProvider::new(pool.clone(), Duration::from_secs(5));
        (
            Arc::new(CollectionStage::new(Arc::new(registry), sessions)),
            pool,
            counters,
        )
    }

    #[tokio::test]
    async fn test_collects_and_hashes_payload() {
        let (stage, pool, _) = stage("<html>listing</html>", 1, 2);
        let mut ctx = pending("https://x/events", "pages");

        stage.process(&mut ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(ctx.state, PipelineState::Collected);
        assert_eq!(ctx.raw_data.as_deref(), Some("<html>listing</html>"));
        assert!(ctx.metadata.content_hash.is_some());
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_unknown_sku_fails_without_touching_pool() {
        let (stage, pool, _) = stage("<html></html>", 1, 1);
        let mut ctx = pending("https://x/events", "missing");

        let err = stage
            .process(&mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::UnknownSku(ref sku) if sku == "missing"));
        assert_eq!(pool.stats().contexts_created, 0);
    }

    #[tokio::test]
    async fn test_empty_page_is_rejected() {
        let (stage, pool, _) = stage("   ", 1, 1);
        let mut ctx = pending("https://x/events", "pages");

        let err = stage
            .process(&mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Transition(_)));
        assert_eq!(ctx.state, PipelineState::Pending);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_panicking_collector_closes_page_and_disposes_context() {
        let (pool, counters) = fake_pool(1, 1, ContextStrategy::Recycle, "<html></html>");
        let mut registry = AdapterRegistry::new();
        registry.register("broken", Arc::new(PanickingCollector), Arc::new(NoopTransformer));
        let sessions = WebPageSessionProvider::new(pool.clone(), Duration::from_secs(5));
        let stage = Arc::new(CollectionStage::new(Arc::new(registry), sessions));

        let h = harness(BackPressureConfig::default());
        h.queue
            .enqueue(&queues::collection(), &pending("https://x/broken", "broken"))
            .await
            .unwrap();
        let runner = StageRunner::new(stage, h.queue.clone(), h.backpressure.clone(), settings(1, 5, 1));
        let outcome = runner.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome,
            IterationOutcome::Processed {
                advanced: 0,
                failed: 1,
                requeued: 0
            }
        );
        assert_eq!(counters.open_pages.load(Ordering::SeqCst), 0);
        assert_eq!(counters.live_contexts.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().in_use, 0);

        let failed = drain(&h, queues::failed()).await;
        assert!(
            failed[0]
                .error_message
                .as_deref()
                .unwrap()
                .contains("selector table missing")
        );
    }

    #[tokio::test]
    async fn test_batch_through_runner_respects_pool_capacity() {
        let (stage, pool, counters) = stage("<html>ok</html>", 1, 2);
        let h = harness(BackPressureConfig::default());
        let mut items: Vec<_> = (0..8)
            .map(|i| pending(&format!("https://x/{}", i), "pages"))
            .collect();
        items.push(pending("https://unreachable.example/1", "pages"));
        h.queue
            .enqueue_batch(&queues::collection(), &items)
            .await
            .unwrap();

        let runner = StageRunner::new(
            stage,
            h.queue.clone(),
            h.backpressure.clone(),
            settings(1, 20, 8),
        );
        let outcome = runner.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome,
            IterationOutcome::Processed {
                advanced: 8,
                failed: 1,
                requeued: 0
            }
        );
        assert!(counters.max_open_pages.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(counters.open_pages.load(Ordering::SeqCst), 0);

        let collected = drain(&h, queues::transformation()).await;
        assert!(collected.iter().all(|c| c.state == PipelineState::Collected));
        let failed = drain(&h, queues::failed()).await;
        assert!(failed[0].error_message.as_deref().unwrap().contains("collection failed"));
    }
}
