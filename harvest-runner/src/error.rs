//! Stage errors
//!
//! Everything here is per item: the stage loop records the message on the
//! context, moves it to `Failed` and carries on with the batch.

use harvest_core::domain::context::TransitionError;
use thiserror::Error;

use crate::browser::PoolError;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("no adapter registered for sku '{0}'")]
    UnknownSku(String),

    #[error("collection failed: {0:#}")]
    Collection(anyhow::Error),

    #[error("browser session unavailable: {0}")]
    Session(#[from] PoolError),

    #[error("transform failed: {0:#}")]
    Transform(anyhow::Error),

    #[error("processing failed: {0:#}")]
    Processing(anyhow::Error),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("stage task panicked: {0}")]
    Panicked(String),

    #[error("cancelled by shutdown")]
    Cancelled,
}

impl StageError {
    /// Whether the failure came from shutdown rather than the item itself
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            StageError::Cancelled | StageError::Session(PoolError::Cancelled)
        )
    }
}
