//! Atelier server binary.

use anyhow::{Context, Result};
use atelier_core::config::AppConfig;
use atelier_server::bootstrap::seed_style_presets;
use atelier_server::ledger::spawn_sweep_task;
use atelier_server::{AppState, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Atelier - An admission-controlled NovelAI image generation gateway
#[derive(Parser, Debug)]
#[command(name = "atelierd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "ATELIER_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Merge the optional config file and `ATELIER_` environment variables.
fn load_config(config_path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(config_path).exists() {
        tracing::info!(config_path = %config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::info!(
            config_path = %config_path,
            "No config file found, using defaults and environment variables"
        );
    }

    figment
        .merge(Env::prefixed("ATELIER_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Atelier v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    // Surface fatal configuration errors as a clean exit instead of the
    // panic in AppState construction.
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    // Register Prometheus metrics
    atelier_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Initialize image storage
    let storage = atelier_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Image storage initialized");

    // Initialize metadata store
    let metadata = atelier_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store initialized");

    seed_style_presets(metadata.as_ref(), &config.style_presets).await?;

    let state = AppState::new(config.clone(), storage, metadata)
        .context("failed to build HTTP clients")?;

    let sweep_interval = state.ledger_sweep_interval();
    spawn_sweep_task(state.ledger.clone(), sweep_interval, state.ledger_retention());
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        "Admission ledger sweep task spawned"
    );

    // Create router
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    // Start server with ConnectInfo for client IP extraction
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
