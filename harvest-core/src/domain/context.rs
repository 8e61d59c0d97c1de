//! Pipeline context
//!
//! A `PipelineContext` is one unit of work (one URL) travelling through the
//! pipeline. Each stage owns the context while it works on it and advances
//! its state exactly once:
//!
//! ```text
//! Pending --collect--> Collected --transform--> Transformed --process--> Completed
//!    \                    \                        \
//!     `--------------------`------------------------`--> Failed
//! ```
//!
//! `Completed` and `Failed` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entity::{ProcessedEntity, content_hash};

/// Lifecycle state of a pipeline context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Pending,
    Collected,
    Transformed,
    Completed,
    Failed,
}

impl PipelineState {
    /// Whether no stage may advance a context in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Pending => write!(f, "Pending"),
            PipelineState::Collected => write!(f, "Collected"),
            PipelineState::Transformed => write!(f, "Transformed"),
            PipelineState::Completed => write!(f, "Completed"),
            PipelineState::Failed => write!(f, "Failed"),
        }
    }
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move context from {from} to {to}")]
    Illegal {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("raw data is empty")]
    EmptyRawData,

    #[error("no processed entities")]
    NoEntities,
}

/// Bookkeeping attached to a context as it moves through the stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// URL the collection stage should load
    pub collection_url: String,

    pub created_at: Option<DateTime<Utc>>,
    pub collected_at: Option<DateTime<Utc>>,
    pub transformed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,

    /// SHA-256 hex digest of the collected raw payload
    pub content_hash: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// One unit of work tracked through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub id: Uuid,

    /// Execution that seeded this context (back-reference only)
    pub job_id: Uuid,

    pub source: String,

    /// Selects the collector/transformer pair
    pub sku_key: String,

    pub metadata: ContextMetadata,

    /// Payload produced by collection, consumed by transformation
    pub raw_data: Option<String>,

    /// Entities produced by transformation, consumed by processing
    #[serde(default)]
    pub processed_entities: Vec<ProcessedEntity>,

    pub state: PipelineState,

    pub error_message: Option<String>,
}

impl PipelineContext {
    /// Creates a new `Pending` context for a single URL
    pub fn new(
        job_id: Uuid,
        source: impl Into<String>,
        sku_key: impl Into<String>,
        collection_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            source: source.into(),
            sku_key: sku_key.into(),
            metadata: ContextMetadata {
                collection_url: collection_url.into(),
                created_at: Some(Utc::now()),
                ..Default::default()
            },
            raw_data: None,
            processed_entities: Vec::new(),
            state: PipelineState::Pending,
            error_message: None,
        }
    }

    /// Adds a tag, returning the context (builder style)
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.tags.insert(key.into(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// `Pending -> Collected`
    ///
    /// Stores the raw payload and its content hash.
    pub fn mark_collected(&mut self, raw_data: String) -> Result<(), TransitionError> {
        self.expect_state(PipelineState::Pending, PipelineState::Collected)?;
        if raw_data.trim().is_empty() {
            return Err(TransitionError::EmptyRawData);
        }

        self.metadata.content_hash = Some(content_hash(raw_data.as_bytes()));
        self.metadata.collected_at = Some(Utc::now());
        self.raw_data = Some(raw_data);
        self.state = PipelineState::Collected;
        Ok(())
    }

    /// `Collected -> Transformed`
    pub fn mark_transformed(
        &mut self,
        entities: Vec<ProcessedEntity>,
    ) -> Result<(), TransitionError> {
        self.expect_state(PipelineState::Collected, PipelineState::Transformed)?;
        if !self.has_raw_data() {
            return Err(TransitionError::EmptyRawData);
        }
        if entities.is_empty() {
            return Err(TransitionError::NoEntities);
        }

        self.processed_entities = entities;
        self.metadata.transformed_at = Some(Utc::now());
        self.state = PipelineState::Transformed;
        Ok(())
    }

    /// `Transformed -> Completed`
    pub fn mark_completed(&mut self) -> Result<(), TransitionError> {
        self.expect_state(PipelineState::Transformed, PipelineState::Completed)?;
        if !self.has_raw_data() {
            return Err(TransitionError::EmptyRawData);
        }
        if self.processed_entities.is_empty() {
            return Err(TransitionError::NoEntities);
        }

        self.metadata.processed_at = Some(Utc::now());
        self.state = PipelineState::Completed;
        Ok(())
    }

    /// Moves a non-terminal context to `Failed`
    ///
    /// Returns `false` (and leaves the context untouched) if the context was
    /// already terminal.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.error_message = Some(message.into());
        self.state = PipelineState::Failed;
        true
    }

    fn has_raw_data(&self) -> bool {
        self.raw_data
            .as_deref()
            .is_some_and(|raw| !raw.trim().is_empty())
    }

    fn expect_state(
        &self,
        expected: PipelineState,
        to: PipelineState,
    ) -> Result<(), TransitionError> {
        if self.state != expected {
            return Err(TransitionError::Illegal {
                from: self.state,
                to,
            });
        }
        Ok(())
    }
}
