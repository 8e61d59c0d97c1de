//! Entities repository
//!
//! - Reading stored fingerprints by natural key
//! - Saving a batch of entities as one unit of work

use anyhow::{Context, Result};
use async_trait::async_trait;
use harvest_client::OrchestratorClient;
use harvest_core::domain::entity::{EntityType, ProcessedEntity};
use harvest_core::dto::entity::{EntityFingerprint, MergeSummary};
use std::sync::Arc;

#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Fingerprints of the stored entities among `slugs`
    async fn get_by_natural_keys(
        &self,
        entity_type: EntityType,
        slugs: Vec<String>,
    ) -> Result<Vec<EntityFingerprint>>;

    /// Upserts `entities` by natural key and commits them together
    async fn save_changes(&self, entities: Vec<ProcessedEntity>) -> Result<MergeSummary>;
}

/// HTTP implementation of EntityRepository
pub struct HttpEntityRepository {
    client: Arc<OrchestratorClient>,
}

impl HttpEntityRepository {
    pub fn new(client: Arc<OrchestratorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EntityRepository for HttpEntityRepository {
    async fn get_by_natural_keys(
        &self,
        entity_type: EntityType,
        slugs: Vec<String>,
    ) -> Result<Vec<EntityFingerprint>> {
        self.client
            .lookup_entities(entity_type, slugs)
            .await
            .with_context(|| format!("Failed to look up {} entities", entity_type))
    }

    async fn save_changes(&self, entities: Vec<ProcessedEntity>) -> Result<MergeSummary> {
        let count = entities.len();
        self.client
            .merge_entities(entities)
            .await
            .with_context(|| format!("Failed to merge {} entities", count))
    }
}

/// Keeps entities in memory, keyed by `(type, slug)`
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryEntityRepository {
    pub stored: parking_lot::Mutex<std::collections::HashMap<(EntityType, String), ProcessedEntity>>,
    pub fail_saves: std::sync::atomic::AtomicBool,
    pub save_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
#[async_trait]
impl EntityRepository for InMemoryEntityRepository {
    async fn get_by_natural_keys(
        &self,
        entity_type: EntityType,
        slugs: Vec<String>,
    ) -> Result<Vec<EntityFingerprint>> {
        let stored = self.stored.lock();
        Ok(slugs
            .into_iter()
            .filter_map(|slug| {
                stored
                    .get(&(entity_type, slug.clone()))
                    .map(|e| EntityFingerprint {
                        slug,
                        content_hash: e.content_hash.clone(),
                    })
            })
            .collect())
    }

    async fn save_changes(&self, entities: Vec<ProcessedEntity>) -> Result<MergeSummary> {
        use std::sync::atomic::Ordering;

        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }

        let mut stored = self.stored.lock();
        let mut summary = MergeSummary::default();
        for entity in entities {
            let key = (entity.entity_type, entity.slug.clone());
            match stored.get(&key) {
                Some(existing) if existing.content_hash == entity.content_hash => {
                    summary.unchanged += 1
                }
                Some(_) => summary.updated += 1,
                None => summary.created += 1,
            }
            stored.insert(key, entity);
        }
        Ok(summary)
    }
}
