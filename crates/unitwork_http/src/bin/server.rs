//! unitwork - API Server Binary
//!
//! Starts the HTTP API server, applying any pending SQL migrations first.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin unitwork-server
//!
//! # Run with environment variables
//! UNITWORK_HOST=0.0.0.0 UNITWORK_PORT=8080 DATABASE_URL=postgres://... cargo run --bin unitwork-server
//! ```
//!
//! # Environment Variables
//!
//! * `UNITWORK_HOST` - Server host (default: 0.0.0.0)
//! * `UNITWORK_PORT` - Server port (default: 8080)
//! * `UNITWORK_DATABASE_URL` / `DATABASE_URL` - PostgreSQL connection string
//! * `UNITWORK_MIGRATIONS_DIR` - Directory of `*.sql` scripts (default: ./migrations)
//! * `UNITWORK_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use unitwork_db::migrate::run_migrations;
use unitwork_http::{config::ApiConfig, create_router};

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, establishes the database
/// pool, runs pending migrations, and starts the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = load_config();
    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting unitwork API server"
    );

    let pool = unitwork_db::create_pool_from_url(&config.database_url)
        .await
        .context("failed to create database pool")?;

    // Apply pending migrations before accepting traffic
    let scripts = discover_migrations(Path::new(&config.migrations_dir))
        .context("failed to read migrations directory")?;
    let report = run_migrations(&pool, &scripts)
        .await
        .context("migration run failed")?;
    tracing::info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "database schema up to date"
    );

    let app = create_router(pool, config.clone());

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .context("invalid server address")?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Loads API configuration from environment variables, honoring a plain
/// `DATABASE_URL` over the prefixed form.
fn load_config() -> ApiConfig {
    let mut config = ApiConfig::from_env().unwrap_or_default();
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database_url = url;
    }
    config
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Collects `*.sql` files from the migrations directory in lexicographic
/// order. The runner applies scripts in exactly the order given, so the
/// filename prefix convention (`001_`, `002_`, ...) is the ordering
/// contract.
fn discover_migrations(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "migrations directory not found, skipping");
        return Ok(Vec::new());
    }

    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("sql") {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// This enables graceful shutdown of the server, allowing in-flight
/// requests to complete before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
