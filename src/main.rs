use axum::Router;
use object_store::aws::AmazonS3Builder;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod clock;
mod config;
mod routes;
mod store;
mod upstream;

use cache::{FreshnessPolicy, Sweeper, WeatherCache};
use clock::{Clock, SystemClock};
use config::{Config, StoreBackend};
use routes::{create_router, AppState};
use store::{ArtifactStore, MemoryStore, ObjectStoreBackend, TimeoutStore};
use upstream::{mock::MockWeatherClient, openweather::OpenWeatherClient, Fetcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_cache=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        backend = ?config.store_backend,
        retention_secs = config.retention.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        default_city = %config.default_city,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&config, clock.clone())?;
    let fetcher = build_fetcher(&config)?;
    let policy = FreshnessPolicy::new(config.retention);

    let cache = Arc::new(WeatherCache::new(
        store.clone(),
        fetcher,
        clock.clone(),
        policy,
        config.upstream_timeout,
    ));

    // Start the eviction sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::new(Sweeper::new(store, policy, clock));
    let sweeper_task = tokio::spawn(sweeper.run(config.sweep_interval, shutdown_rx));

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        cache,
    };

    let app: Router = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let an in-flight sweep finish before exiting.
    shutdown_tx.send(true).ok();
    if let Err(e) = sweeper_task.await {
        tracing::error!("Sweeper task ended abnormally: {}", e);
    }

    Ok(())
}

fn build_store(config: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<dyn ArtifactStore>> {
    let store: Arc<dyn ArtifactStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-process artifact store; cached data is lost on restart");
            Arc::new(TimeoutStore::new(
                MemoryStore::with_page_size(clock, config.store_list_page_size),
                config.store_timeout,
            ))
        }
        StoreBackend::S3 => {
            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(&config.store_bucket)
                .with_region(&config.store_region);
            if let Some(endpoint) = &config.store_endpoint {
                builder = builder.with_endpoint(endpoint).with_allow_http(true);
            }
            let s3 = builder.build()?;
            tracing::info!(bucket = %config.store_bucket, "Using S3 artifact store");
            Arc::new(TimeoutStore::new(
                ObjectStoreBackend::new(Arc::new(s3), config.store_list_page_size),
                config.store_timeout,
            ))
        }
    };
    Ok(store)
}

fn build_fetcher(config: &Config) -> anyhow::Result<Arc<dyn Fetcher>> {
    match &config.openweather_api_key {
        Some(key) => Ok(Arc::new(OpenWeatherClient::new(config, key.clone())?)),
        None => {
            tracing::warn!("OPENWEATHER_API_KEY not set, serving synthetic weather data");
            Ok(Arc::new(MockWeatherClient::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
