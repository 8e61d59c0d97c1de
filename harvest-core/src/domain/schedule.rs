//! Schedule domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recurring collection definition
///
/// A schedule without a cron expression runs once and is deactivated after
/// its execution is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub source: String,
    pub sku: String,
    pub name: String,
    pub cron_expression: Option<String>,
    pub is_active: bool,
    pub next_execution: Option<DateTime<Utc>>,
    pub last_executed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sitemaps: Vec<Sitemap>,
}

impl Schedule {
    pub fn is_one_shot(&self) -> bool {
        self.cron_expression.is_none()
    }

    pub fn active_sitemaps(&self) -> impl Iterator<Item = &Sitemap> {
        self.sitemaps.iter().filter(|s| s.is_active)
    }
}

/// Sitemap owned by a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sitemap {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub url: String,
    /// Applied to URLs extracted from the sitemap
    pub regex_filter: Option<String>,
    pub is_active: bool,
}
