//! trialmatch-engine - trial identity resolution and review service
//!
//! Resolves extracted protocol identities against the trial catalog, scores
//! criterion similarity with human-tuned thresholds, and runs the manual
//! review queue. HTTP REST + SSE on port 5740 by default.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trialmatch_common::config::{default_config_path, prepare_root_folder, resolve_root_folder, ROOT_FOLDER_ENV};
use trialmatch_common::EventBus;

use trialmatch_engine::config::{resolve_embedding_api_key, resolve_low_confidence_threshold, EngineConfig};
use trialmatch_engine::db::catalog::SqliteCatalog;
use trialmatch_engine::services::HttpEmbeddingClient;
use trialmatch_engine::AppState;

/// Command-line arguments for trialmatch-engine
#[derive(Parser, Debug)]
#[command(name = "trialmatch-engine")]
#[command(about = "Trial identity resolution and manual review service")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Configuration file (defaults to the platform config location)
    #[arg(short, long, env = "TRIALMATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on, overriding `[server] port`
    #[arg(short, long, env = "TRIALMATCH_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.config.clone().or_else(default_config_path) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    init_tracing(&config.base.logging.level, config.base.logging.json)?;

    info!("Starting trialmatch-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, Some(&config.base));
    let db_path = prepare_root_folder(&root_folder).context("Failed to initialize root folder")?;
    info!("Database: {}", db_path.display());

    let db = trialmatch_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    // The engine still serves matching and review without embeddings
    let api_key = match resolve_embedding_api_key(&db, &config.embedding).await {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(error = %e, "Similarity comparisons will fail until an API key is configured");
            None
        }
    };
    let embeddings = HttpEmbeddingClient::new(&config.embedding, api_key)
        .context("Failed to build embedding client")?;

    let low_confidence = resolve_low_confidence_threshold(&db, &config.matching).await?;
    let events = EventBus::new(256);

    let state = AppState::new(
        db.clone(),
        &config,
        Arc::new(SqliteCatalog::new(db.clone())),
        Arc::new(embeddings),
        low_confidence,
        events,
    );
    state.reviews.restore().await.context("Failed to restore review queue")?;

    let mut server = config.base.server.clone();
    if let Some(port) = args.port {
        server.port = port;
    }
    let address = server.bind_address();

    let app = trialmatch_engine::build_router(state);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// RUST_LOG wins; otherwise the configured level
fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
