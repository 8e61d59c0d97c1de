//! Entity persistence DTOs

use serde::{Deserialize, Serialize};

use crate::domain::entity::{EntityType, ProcessedEntity};

/// Batch of entities to upsert by natural key in one unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeEntities {
    pub entities: Vec<ProcessedEntity>,
}

/// Outcome counts of a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// Lookup of existing entities by natural key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupEntities {
    pub entity_type: EntityType,
    pub slugs: Vec<String>,
}

/// Natural key and stored content hash of an existing entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFingerprint {
    pub slug: String,
    pub content_hash: String,
}
