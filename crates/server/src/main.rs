use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anitrack_core::{
    create_writeback_system, load_config, load_config_from_env, validate_config, AnimeTracker,
    Config, ConfigError, KitsuClient, LibraryOpener, LibraryStore, RemoteCatalog,
};
use anitrack_server::api::create_router;
use anitrack_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "ANITRACK_CONFIG";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("anitrack {} starting", VERSION);

    let config = read_config()?;

    // Validate configuration
    validate_config(&config).context("Invalid configuration")?;

    // Open the library (schema is created on first open)
    info!("Opening library at {:?}", config.database.path);
    let opener = LibraryOpener::new(config.database.path.clone());
    let library = opener
        .initialize()
        .await
        .with_context(|| format!("Failed to open library at {:?}", config.database.path))?;
    let store: Arc<dyn LibraryStore> = library;

    // Remote catalog
    let remote: Arc<dyn RemoteCatalog> = Arc::new(
        KitsuClient::new(&config.catalog).context("Failed to create catalog client")?,
    );
    info!("Catalog: {}", config.catalog.base_url);

    // Write-behind persistence of catalog reads
    let (writeback_handle, writer) =
        create_writeback_system(Arc::clone(&store), config.writeback.buffer_size);
    let writer_handle = tokio::spawn(writer.run());

    let tracker = Arc::new(AnimeTracker::new(remote, store, writeback_handle));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, tracker));

    // Create router
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router (and with it every WritebackHandle) is gone once serve
    // returns, so the writer drains its queue and exits.
    info!("Server shutting down...");
    let _ = writer_handle.await;
    info!("Write-behind writer stopped");

    Ok(())
}

/// Load the config file, or defaults plus environment when no file was asked for.
fn read_config() -> Result<Config> {
    let explicit = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
    let config_path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    match load_config(&config_path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) if explicit.is_none() => {
            info!("No config file, using defaults and environment");
            load_config_from_env().context("Failed to load config from environment")
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config from {:?}", config_path)),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
