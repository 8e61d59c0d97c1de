//! Job-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use harvest_core::domain::execution::Execution;
use harvest_core::dto::job::{CreateJob, LaunchedJob};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Jobs
    // =============================================================================

    /// Run a schedule now
    ///
    /// The returned execution is already `Executed` (with the number of
    /// seeded contexts) or `Failed`.
    pub async fn create_job(&self, req: CreateJob) -> Result<LaunchedJob> {
        let response = self
            .client
            .post(self.url("/job/create"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<Execution> {
        let response = self
            .client
            .get(self.url(&format!("/job/{}", job_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List the jobs of a schedule, newest first
    pub async fn list_jobs_by_schedule(&self, schedule_id: Uuid) -> Result<Vec<Execution>> {
        let response = self
            .client
            .get(self.url(&format!("/job/schedule/{}", schedule_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
