//! Job DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::Execution;

/// Request to run a schedule now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub schedule_id: Uuid,
}

/// Execution created by a manual trigger, with the number of seeded contexts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchedJob {
    pub execution: Execution,
    pub seeded: usize,
}
