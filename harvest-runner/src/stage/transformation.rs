//! Transformation stage: `Collected -> Transformed`

use async_trait::async_trait;
use harvest_core::domain::context::{PipelineContext, PipelineState, TransitionError};
use harvest_queue::{QueueConfig, queues};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{StageProcessor, expect_state};
use crate::adapter::AdapterRegistry;
use crate::error::StageError;

pub struct TransformationStage {
    registry: Arc<AdapterRegistry>,
}

impl TransformationStage {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StageProcessor for TransformationStage {
    fn name(&self) -> &'static str {
        "transformation"
    }

    fn input(&self) -> QueueConfig<PipelineContext> {
        queues::transformation()
    }

    fn output(&self) -> Option<QueueConfig<PipelineContext>> {
        Some(queues::processing())
    }

    async fn process(
        &self,
        ctx: &mut PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        expect_state(ctx, PipelineState::Collected, PipelineState::Transformed)?;

        let transformer = self
            .registry
            .transformer(&ctx.sku_key)
            .ok_or_else(|| StageError::UnknownSku(ctx.sku_key.clone()))?;

        let raw = ctx
            .raw_data
            .as_deref()
            .ok_or(TransitionError::EmptyRawData)?;
        let entities = transformer
            .transform(raw)
            .await
            .map_err(StageError::Transform)?;

        debug!("Context {} produced {} entities", ctx.id, entities.len());
        // Rejects an empty entity list
        ctx.mark_transformed(entities)?;
        Ok(())
    }
}
