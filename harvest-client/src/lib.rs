//! Harvest HTTP Client
//!
//! A type-safe HTTP client for the Harvest orchestrator API, shared by the
//! runner (entity persistence) and the CLI (schedules, jobs, queue health).
//!
//! # Example
//!
//! ```no_run
//! use harvest_client::OrchestratorClient;
//! use harvest_core::dto::schedule::{CreateSchedule, CreateSitemap};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let schedule = client.create_schedule(CreateSchedule {
//!         source: "example-venue".to_string(),
//!         sku: "json-ld-events".to_string(),
//!         name: "Nightly events".to_string(),
//!         cron_expression: Some("0 2 * * *".to_string()),
//!         sitemaps: vec![CreateSitemap {
//!             url: "https://example.com/sitemap.xml".to_string(),
//!             regex_filter: Some("/events/".to_string()),
//!         }],
//!     }).await?;
//!
//!     println!("Created schedule: {}", schedule.id);
//!     Ok(())
//! }
//! ```

mod entities;
pub mod error;
mod jobs;
mod queues;
mod schedules;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client for the Harvest orchestrator API
///
/// Methods are grouped by endpoint family:
/// - Schedule management (create, list, get, delete, add sitemap)
/// - Jobs (manual trigger, get, list per schedule)
/// - Queue health
/// - Entity merge and lookup
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            return Err(Self::error_from(status.as_u16(), response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            return Err(Self::error_from(status.as_u16(), response).await);
        }

        Ok(())
    }

    /// Extracts the `{"error": ...}` message of an API error, or the raw body
    async fn error_from(status: u16, response: reqwest::Response) -> ClientError {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);

        debug!("Orchestrator returned {}: {}", status, message);
        ClientError::api_error(status, message)
    }
}
