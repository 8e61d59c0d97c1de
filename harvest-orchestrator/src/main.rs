use harvest_orchestrator::config::Config;
use harvest_orchestrator::service::dispatch::{DispatchSettings, Dispatcher};
use harvest_orchestrator::service::sitemap::HttpSitemapLoader;
use harvest_orchestrator::state::AppState;
use harvest_orchestrator::{api, db};
use harvest_queue::{BackPressureManager, QueueClient, QueueHealthMonitor, RedisQueueStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harvest_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Harvest Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool).await?;

    // Queue store, health monitor and backpressure
    let store = Arc::new(RedisQueueStore::connect(
        &config.queue.redis_url,
        &config.queue.namespace,
    )?);
    let monitor = Arc::new(QueueHealthMonitor::new(
        store.clone(),
        config.backpressure.queue_thresholds.clone(),
    ));
    let queue = QueueClient::new(store, config.queue.clone(), monitor.clone());
    let backpressure = Arc::new(BackPressureManager::new(
        monitor.clone(),
        config.backpressure.clone(),
    ));

    let loader = Arc::new(HttpSitemapLoader::new(config.sitemap_timeout)?);
    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        queue,
        backpressure,
        loader,
        DispatchSettings {
            stage: config.dispatch.clone(),
            stale_tolerance: config.stale_tolerance(),
        },
    ));

    // Shutdown signal shared by the dispatcher and the HTTP server
    let cancel = CancellationToken::new();
    let dispatch_handle = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        pool,
        dispatcher,
        monitor,
        config: Arc::new(config),
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Err(e) = dispatch_handle.await {
        tracing::error!("Dispatcher task failed: {}", e);
    }

    tracing::info!("Orchestrator stopped");
    Ok(())
}
