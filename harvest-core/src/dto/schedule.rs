//! Schedule DTOs

use serde::{Deserialize, Serialize};

/// Request to create a new schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSchedule {
    pub source: String,
    pub sku: String,
    pub name: String,
    /// `None` means run once, as soon as possible
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub sitemaps: Vec<CreateSitemap>,
}

/// Sitemap attached to a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSitemap {
    pub url: String,
    pub regex_filter: Option<String>,
}
