//! Schedule-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use harvest_core::domain::schedule::{Schedule, Sitemap};
use harvest_core::dto::schedule::{CreateSchedule, CreateSitemap};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Schedule Management
    // =============================================================================

    /// Create a new schedule
    pub async fn create_schedule(&self, req: CreateSchedule) -> Result<Schedule> {
        let response = self
            .client
            .post(self.url("/schedule/create"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all schedules
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let response = self.client.get(self.url("/schedule/list")).send().await?;

        self.handle_response(response).await
    }

    /// Get a schedule by ID, with its sitemaps
    pub async fn get_schedule(&self, schedule_id: Uuid) -> Result<Schedule> {
        let response = self
            .client
            .get(self.url(&format!("/schedule/{}", schedule_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Delete a schedule
    pub async fn delete_schedule(&self, schedule_id: Uuid) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/schedule/{}", schedule_id)))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Attach a sitemap to a schedule
    pub async fn add_sitemap(&self, schedule_id: Uuid, req: CreateSitemap) -> Result<Sitemap> {
        let response = self
            .client
            .post(self.url(&format!("/schedule/{}/sitemaps", schedule_id)))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
