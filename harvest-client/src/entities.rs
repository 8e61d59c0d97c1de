//! Entity persistence endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use harvest_core::domain::entity::{EntityType, ProcessedEntity};
use harvest_core::dto::entity::{EntityFingerprint, LookupEntities, MergeEntities, MergeSummary};

impl OrchestratorClient {
    /// Upsert entities by natural key in one unit of work
    pub async fn merge_entities(&self, entities: Vec<ProcessedEntity>) -> Result<MergeSummary> {
        let response = self
            .client
            .post(self.url("/entities/merge"))
            .json(&MergeEntities { entities })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Fingerprints of the existing entities among `slugs`
    pub async fn lookup_entities(
        &self,
        entity_type: EntityType,
        slugs: Vec<String>,
    ) -> Result<Vec<EntityFingerprint>> {
        let response = self
            .client
            .post(self.url("/entities/lookup"))
            .json(&LookupEntities { entity_type, slugs })
            .send()
            .await?;

        self.handle_response(response).await
    }
}
