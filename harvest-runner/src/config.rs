//! Runner configuration
//!
//! Defines all configurable parameters for the runner: the three stage
//! loops, the browser pool, queue access and the orchestrator connection.

use harvest_queue::config::env_or;
use harvest_queue::{BackPressureConfig, QueueSettings, StageSettings};
use std::time::Duration;

/// End-of-life policy for a browser context after one page session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// Return the context to the pool for the next session
    Reuse,
    /// Dispose the context and let the pool create a fresh one
    Recycle,
}

impl std::str::FromStr for ContextStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reuse" => Ok(ContextStrategy::Reuse),
            "recycle" => Ok(ContextStrategy::Recycle),
            other => Err(format!("unknown context strategy: {}", other)),
        }
    }
}

/// Browser pool settings
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Number of browser instances
    pub browser_concurrency: usize,

    /// Concurrent contexts (and so pages) per browser instance
    pub context_concurrency: usize,

    pub context_strategy: ContextStrategy,

    /// Navigation timeout for a single page
    pub page_timeout: Duration,

    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            browser_concurrency: 2,
            context_concurrency: 4,
            context_strategy: ContextStrategy::Reuse,
            page_timeout: Duration::from_secs(30),
            headless: true,
        }
    }
}

impl BrowserSettings {
    /// Upper bound on concurrently open pages
    pub fn capacity(&self) -> usize {
        self.browser_concurrency * self.context_concurrency
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Orchestrator base URL (e.g., "http://localhost:8080")
    pub orchestrator_url: String,

    pub collection: StageSettings,
    pub transformation: StageSettings,
    pub processing: StageSettings,

    pub browser: BrowserSettings,

    pub queue: QueueSettings,

    pub backpressure: BackPressureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runner_id: uuid::Uuid::new_v4().to_string(),
            orchestrator_url: "http://localhost:8080".to_string(),
            collection: StageSettings {
                delay_interval: Duration::from_secs(5),
                min_batch_size: 1,
                max_batch_size: 10,
                concurrency: 8,
            },
            transformation: StageSettings {
                delay_interval: Duration::from_secs(2),
                min_batch_size: 5,
                max_batch_size: 50,
                concurrency: 4,
            },
            processing: StageSettings {
                delay_interval: Duration::from_secs(2),
                min_batch_size: 5,
                max_batch_size: 50,
                concurrency: 2,
            },
            browser: BrowserSettings::default(),
            queue: QueueSettings::default(),
            backpressure: BackPressureConfig::default(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - RUNNER_ID (default: random UUID)
    /// - ORCHESTRATOR_URL (default: http://localhost:8080)
    /// - COLLECTION_*, TRANSFORMATION_*, PROCESSING_* stage settings
    ///   (DELAY_INTERVAL_SECONDS, MIN_BATCH_SIZE, MAX_BATCH_SIZE, CONCURRENCY)
    /// - BROWSER_CONCURRENCY (default: 2)
    /// - BROWSER_CONTEXT_CONCURRENCY (default: 4)
    /// - BROWSER_CONTEXT_STRATEGY (reuse|recycle, default: reuse)
    /// - BROWSER_PAGE_TIMEOUT_SECONDS (default: 30)
    /// - BROWSER_HEADLESS (default: true)
    /// - queue and backpressure variables, see `harvest_queue::config`
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let browser = defaults.browser;

        Ok(Self {
            runner_id: env_or("RUNNER_ID", defaults.runner_id),
            orchestrator_url: env_or("ORCHESTRATOR_URL", defaults.orchestrator_url),
            collection: StageSettings::from_env("COLLECTION", defaults.collection),
            transformation: StageSettings::from_env("TRANSFORMATION", defaults.transformation),
            processing: StageSettings::from_env("PROCESSING", defaults.processing),
            browser: BrowserSettings {
                browser_concurrency: env_or("BROWSER_CONCURRENCY", browser.browser_concurrency),
                context_concurrency: env_or(
                    "BROWSER_CONTEXT_CONCURRENCY",
                    browser.context_concurrency,
                ),
                context_strategy: env_or("BROWSER_CONTEXT_STRATEGY", browser.context_strategy),
                page_timeout: Duration::from_secs(env_or(
                    "BROWSER_PAGE_TIMEOUT_SECONDS",
                    browser.page_timeout.as_secs(),
                )),
                headless: harvest_queue::config::env_flag("BROWSER_HEADLESS", browser.headless),
            },
            queue: QueueSettings::from_env(),
            backpressure: BackPressureConfig::from_env()?,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if !self.orchestrator_url.starts_with("http://")
            && !self.orchestrator_url.starts_with("https://")
        {
            anyhow::bail!("orchestrator_url must start with http:// or https://");
        }

        if self.browser.browser_concurrency == 0 {
            anyhow::bail!("browser_concurrency must be greater than 0");
        }

        if self.browser.context_concurrency == 0 {
            anyhow::bail!("context_concurrency must be greater than 0");
        }

        if self.browser.page_timeout.is_zero() {
            anyhow::bail!("page_timeout must be greater than 0");
        }

        self.collection.validate("collection")?;
        self.transformation.validate("transformation")?;
        self.processing.validate("processing")?;
        self.queue.validate()?;
        self.backpressure.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.browser.capacity(), 8);
        assert_eq!(config.browser.context_strategy, ContextStrategy::Reuse);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.runner_id = String::new();
        assert!(config.validate().is_err());
        config.runner_id = "test".to_string();

        config.orchestrator_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
        config.orchestrator_url = "http://localhost:8080".to_string();

        config.browser.context_concurrency = 0;
        assert!(config.validate().is_err());
        config.browser.context_concurrency = 2;

        config.processing.min_batch_size = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_context_strategy_parsing() {
        assert_eq!("reuse".parse(), Ok(ContextStrategy::Reuse));
        assert_eq!(" Recycle ".parse(), Ok(ContextStrategy::Recycle));
        assert!("discard".parse::<ContextStrategy>().is_err());
    }
}
