//! Execution (job) domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One concrete run of a schedule
///
/// Created at dispatch time, moved to `Executed` once its pipeline contexts
/// are enqueued, or `Failed` if seeding fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub status: ExecutionStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Number of pipeline contexts seeded
    pub seeded_count: Option<i64>,
    pub error_message: Option<String>,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Created,
    Executed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Created => "Created",
            ExecutionStatus::Executed => "Executed",
            ExecutionStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(ExecutionStatus::Created),
            "Executed" => Ok(ExecutionStatus::Executed),
            "Failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}
