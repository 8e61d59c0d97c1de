//! Processing stage: `Transformed -> Completed`
//!
//! Looks up the stored fingerprints of every entity on the context, skips
//! the ones whose content hash has not changed and saves the rest in one
//! unit of work.

use async_trait::async_trait;
use harvest_core::domain::context::{PipelineContext, PipelineState};
use harvest_core::domain::entity::{EntityType, ProcessedEntity};
use harvest_queue::{QueueConfig, queues};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{StageProcessor, expect_state};
use crate::error::StageError;
use crate::repository::EntityRepository;

pub struct ProcessingStage {
    repository: Arc<dyn EntityRepository>,
}

impl ProcessingStage {
    pub fn new(repository: Arc<dyn EntityRepository>) -> Self {
        Self { repository }
    }

    /// Entities whose stored hash differs from, or is missing for, the new one
    async fn changed_entities(
        &self,
        entities: &[ProcessedEntity],
    ) -> Result<Vec<ProcessedEntity>, StageError> {
        let mut by_type: HashMap<EntityType, Vec<&ProcessedEntity>> = HashMap::new();
        for entity in entities {
            by_type.entry(entity.entity_type).or_default().push(entity);
        }

        let mut changed = Vec::with_capacity(entities.len());
        for (entity_type, group) in by_type {
            let slugs = group.iter().map(|e| e.slug.clone()).collect();
            let stored: HashMap<String, String> = self
                .repository
                .get_by_natural_keys(entity_type, slugs)
                .await
                .map_err(StageError::Processing)?
                .into_iter()
                .map(|f| (f.slug, f.content_hash))
                .collect();

            changed.extend(
                group
                    .into_iter()
                    .filter(|e| stored.get(&e.slug) != Some(&e.content_hash))
                    .cloned(),
            );
        }

        Ok(changed)
    }
}

#[async_trait]
impl StageProcessor for ProcessingStage {
    fn name(&self) -> &'static str {
        "processing"
    }

    fn input(&self) -> QueueConfig<PipelineContext> {
        queues::processing()
    }

    fn output(&self) -> Option<QueueConfig<PipelineContext>> {
        None
    }

    async fn process(
        &self,
        ctx: &mut PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        expect_state(ctx, PipelineState::Transformed, PipelineState::Completed)?;

        let total = ctx.processed_entities.len();
        let changed = self.changed_entities(&ctx.processed_entities).await?;
        let skipped = total - changed.len();

        if changed.is_empty() {
            debug!("Context {}: all {} entities unchanged", ctx.id, total);
        } else {
            let summary = self
                .repository
                .save_changes(changed)
                .await
                .map_err(StageError::Processing)?;
            debug!(
                "Context {}: {} created, {} updated, {} unchanged",
                ctx.id,
                summary.created,
                summary.updated,
                summary.unchanged + skipped
            );
        }

        ctx.mark_completed()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryEntityRepository;
    use crate::stage::tests::{drain, harness, settings};
    use crate::stage::{IterationOutcome, StageRunner};
    use harvest_queue::BackPressureConfig;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn entity(t: EntityType, slug: &str, name: &str) -> ProcessedEntity {
        ProcessedEntity::new(t, slug, json!({ "name": name }))
    }

    fn transformed(entities: Vec<ProcessedEntity>) -> PipelineContext {
        let mut ctx = PipelineContext::new(uuid::Uuid::new_v4(), "test", "sku", "https://x");
        ctx.mark_collected("<html></html>".to_string()).unwrap();
        ctx.mark_transformed(entities).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_saves_new_entities_and_completes() {
        let repo = Arc::new(InMemoryEntityRepository::default());
        let stage = ProcessingStage::new(repo.clone());
        let mut ctx = transformed(vec![
            entity(EntityType::Event, "quiz", "Quiz"),
            entity(EntityType::Venue, "local", "The Local"),
        ]);

        stage.process(&mut ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(ctx.state, PipelineState::Completed);
        assert_eq!(repo.stored.lock().len(), 2);
        assert_eq!(repo.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unchanged_entities_are_not_saved() {
        let repo = Arc::new(InMemoryEntityRepository::default());
        let stage = ProcessingStage::new(repo.clone());
        let venue = entity(EntityType::Venue, "local", "The Local");

        let mut first = transformed(vec![venue.clone()]);
        stage.process(&mut first, &CancellationToken::new()).await.unwrap();

        let mut second = transformed(vec![venue]);
        stage.process(&mut second, &CancellationToken::new()).await.unwrap();
        assert_eq!(second.state, PipelineState::Completed);
        assert_eq!(repo.save_calls.load(Ordering::SeqCst), 1);

        let mut renamed = transformed(vec![entity(EntityType::Venue, "local", "The Local Pub")]);
        stage.process(&mut renamed, &CancellationToken::new()).await.unwrap();
        assert_eq!(repo.save_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            repo.stored.lock()[&(EntityType::Venue, "local".to_string())].data["name"],
            "The Local Pub"
        );
    }

    #[tokio::test]
    async fn test_save_failure_fails_context_through_runner() {
        let repo = Arc::new(InMemoryEntityRepository::default());
        repo.fail_saves.store(true, Ordering::SeqCst);
        let h = harness(BackPressureConfig::default());
        h.queue
            .enqueue(
                &queues::processing(),
                &transformed(vec![entity(EntityType::Act, "band", "Band")]),
            )
            .await
            .unwrap();

        let runner = StageRunner::new(
            Arc::new(ProcessingStage::new(repo)),
            h.queue.clone(),
            h.backpressure.clone(),
            settings(1, 10, 2),
        );
        let outcome = runner.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome,
            IterationOutcome::Processed {
                advanced: 0,
                failed: 1,
                requeued: 0
            }
        );
        let failed = drain(&h, queues::failed()).await;
        assert_eq!(failed[0].state, PipelineState::Failed);
        assert!(
            failed[0]
                .error_message
                .as_deref()
                .unwrap()
                .contains("database unavailable")
        );
    }
}
