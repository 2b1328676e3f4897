use anyhow::{Context, Result};
use image_api::config::Config;
use image_api::storage::{ObjectStore, S3Store};
use image_api::{create_router, start_api_server, AppState};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config);

    info!(
        service = %config.service.name,
        environment = ?config.service.environment,
        "Starting image API"
    );

    if config.service.metrics_port != 0 {
        init_metrics(config.service.metrics_port)?;
    }

    let store = S3Store::new(&config.s3)
        .await
        .context("Failed to initialize S3 store")?;
    info!(bucket = %store.bucket(), namespace = %config.storage.namespace, "Storage ready");

    let store: Arc<dyn ObjectStore> = Arc::new(store);
    let router = create_router(AppState::new(store, &config), &config);

    start_api_server(router, &config.listen_addr(), shutdown_signal()).await?;

    info!("Image API stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));

    let development = config.service.environment.is_development();

    tracing_subscriber::registry()
        .with(env_filter)
        .with((!development).then(|| fmt::layer().json()))
        .with(development.then(|| fmt::layer()))
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
