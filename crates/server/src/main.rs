use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reel_core::manager::{
    build_download_client, build_indexers, build_metadata_clients, build_notifiers,
};
use reel_core::subtitles::{SubDbProvider, SubtitleProvider};
use reel_core::{load_config, validate_config, Library, Manager, SqliteLibrary};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("REEL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    let library: Arc<dyn Library> = Arc::new(
        SqliteLibrary::open(&config.database.path).context("Failed to open library database")?,
    );
    info!(path = %config.database.path.display(), "Library database ready");

    let download_client = build_download_client(&config);
    let indexers = build_indexers(&config);
    let metadata = build_metadata_clients(&config);
    let notifiers = build_notifiers(&config);
    let subtitles: Arc<dyn SubtitleProvider> = Arc::new(SubDbProvider::new(
        Duration::from_secs(config.app.http_timeout_secs),
    ));

    let manager = Arc::new(Manager::new(
        config,
        library,
        download_client,
        indexers,
        metadata,
        notifiers,
        Some(subtitles),
        // Magnet-to-torrent conversion needs an external resolver; without
        // one, magnets are handed to the download client as-is.
        None,
    ));

    manager.start().await;
    info!("Reel is running; press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    manager.stop();
    // Give in-flight queue work a moment to wind down.
    tokio::time::sleep(Duration::from_millis(500)).await;

    Ok(())
}
