use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use harvester_core::{
    load_config, validate_config, HttpPortalNavigator, PdfToTextExtractor, PortalNavigator,
    PublicationStore, RunCoordinator, RunLogStore, Scheduler, SqlitePublicationStore,
    SqliteRunLogStore, TextExtractor,
};
use harvester_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into());
    let json = std::env::var("HARVESTER_LOG_JSON").is_ok_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    init_logging();

    let config_path = std::env::var("HARVESTER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        portal = %config.portal.base_url,
        database = ?config.database.path,
        downloads = ?config.downloads.root,
        "Configuration loaded"
    );

    let store: Arc<dyn PublicationStore> = Arc::new(
        SqlitePublicationStore::new(&config.database.path)
            .context("Failed to create publication store")?,
    );
    let run_logs: Arc<dyn RunLogStore> = Arc::new(
        SqliteRunLogStore::new(&config.database.path)
            .context("Failed to create run log store")?,
    );
    info!("Stores initialized");

    let navigator: Arc<dyn PortalNavigator> = Arc::new(
        HttpPortalNavigator::new(&config.portal).context("Failed to create portal navigator")?,
    );
    let extractor: Arc<dyn TextExtractor> = Arc::new(PdfToTextExtractor::new(&config.extraction));

    let coordinator = Arc::new(RunCoordinator::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&run_logs),
        navigator,
        extractor,
    ));
    coordinator.start().await;

    let scheduler = Scheduler::new(&config.scheduler, Arc::clone(&coordinator))
        .context("Invalid scheduler configuration")?;
    scheduler.start();

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        Arc::clone(&coordinator),
        store,
        run_logs,
    ));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    scheduler.stop();
    coordinator.stop().await;
    info!("Run worker and scheduler stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
