//! Harvest Runner
//!
//! A stateless worker that drives pipeline contexts through the collection,
//! transformation and processing stages.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Browser: bounded pool of headless browsers and scoped page sessions
//! - Adapters: collector/transformer pairs keyed by SKU
//! - Repositories: entity persistence through the orchestrator
//! - Stages: one queue-driven loop per stage, all sharing one shutdown signal
//!
//! Contexts arrive on the collection queue (seeded by the orchestrator),
//! move stage to stage over the shared queue store, and end either
//! persisted or on the failed queue.

mod adapter;
mod browser;
mod config;
mod error;
mod repository;
mod stage;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapter::AdapterRegistry;
use crate::browser::{BrowserResourceManager, ChromiumDriver, WebPageSessionProvider};
use crate::config::Config;
use crate::repository::HttpEntityRepository;
use crate::stage::{
    CollectionStage, ProcessingStage, StageProcessor, StageRunner, TransformationStage,
};
use harvest_client::OrchestratorClient;
use harvest_queue::{BackPressureManager, QueueClient, QueueHealthMonitor, RedisQueueStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harvest_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Harvest Runner");

    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, orchestrator_url={}",
        config.runner_id, config.orchestrator_url
    );

    let client = Arc::new(OrchestratorClient::new(config.orchestrator_url.clone()));
    wait_for_orchestrator(&client).await?;

    // Queue store, health monitor and backpressure
    let store = Arc::new(
        RedisQueueStore::connect(&config.queue.redis_url, &config.queue.namespace)
            .context("Failed to connect to queue store")?,
    );
    let monitor = Arc::new(QueueHealthMonitor::new(
        store.clone(),
        config.backpressure.queue_thresholds.clone(),
    ));
    let queue = QueueClient::new(store, config.queue.clone(), monitor.clone());
    let backpressure = Arc::new(BackPressureManager::new(
        monitor,
        config.backpressure.clone(),
    ));

    let registry = Arc::new(AdapterRegistry::builtin());
    info!("Registered adapters: {}", registry.skus().join(", "));

    let pool = Arc::new(
        BrowserResourceManager::launch(
            Arc::new(ChromiumDriver::new(config.browser.headless)),
            &config.browser,
        )
        .await
        .context("Failed to start browser pool")?,
    );
    let sessions = WebPageSessionProvider::new(pool.clone(), config.browser.page_timeout);
    info!(
        "Browser pool capacity: {} concurrent page(s)",
        config.browser.capacity()
    );

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    handles.push(spawn_stage(
        CollectionStage::new(registry.clone(), sessions),
        &queue,
        &backpressure,
        config.collection.clone(),
        &cancel,
    ));
    handles.push(spawn_stage(
        TransformationStage::new(registry),
        &queue,
        &backpressure,
        config.transformation.clone(),
        &cancel,
    ));
    handles.push(spawn_stage(
        ProcessingStage::new(Arc::new(HttpEntityRepository::new(client))),
        &queue,
        &backpressure,
        config.processing.clone(),
        &cancel,
    ));

    info!("Runner initialized successfully");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received, draining stages");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Stage task failed: {}", e);
        }
    }

    info!("Browser pool before shutdown: {:?}", pool.stats());
    pool.shutdown().await;
    info!("Runner stopped");
    Ok(())
}

fn spawn_stage<P: StageProcessor>(
    processor: P,
    queue: &QueueClient,
    backpressure: &Arc<BackPressureManager>,
    settings: harvest_queue::StageSettings,
    cancel: &CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let runner = StageRunner::new(
        Arc::new(processor),
        queue.clone(),
        backpressure.clone(),
        settings,
    );
    let cancel = cancel.child_token();
    tokio::spawn(async move { runner.run(cancel).await })
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            warn!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Waits for the orchestrator to answer its health check, with exponential backoff
///
/// The orchestrator may still be starting when the runner comes up (common
/// in container environments).
async fn wait_for_orchestrator(client: &OrchestratorClient) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.health().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Orchestrator reachable after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    return Err(anyhow::anyhow!(
                        "Orchestrator unreachable after {} attempts: {}",
                        MAX_RETRIES,
                        e
                    ));
                }

                warn!(
                    "Orchestrator not reachable (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
