//! Configuration module
//!
//! Handles CLI configuration including orchestrator URL and output format.

use harvest_client::OrchestratorClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator service
    pub orchestrator_url: String,

    /// Emit JSON instead of formatted text
    pub json: bool,
}

impl Config {
    pub fn client(&self) -> OrchestratorClient {
        OrchestratorClient::new(self.orchestrator_url.clone())
    }
}
