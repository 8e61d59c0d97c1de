//! Queue health endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use harvest_core::domain::queue::QueueHealth;

impl OrchestratorClient {
    /// Health of one pipeline queue
    pub async fn queue_health(&self, queue: &str) -> Result<QueueHealth> {
        let response = self
            .client
            .get(self.url(&format!("/queue/{}/health", queue)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Health of every pipeline queue
    pub async fn all_queue_health(&self) -> Result<Vec<QueueHealth>> {
        let response = self.client.get(self.url("/queue/health")).send().await?;

        self.handle_response(response).await
    }
}
