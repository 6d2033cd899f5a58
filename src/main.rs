//! RecipeGraph Engine
//!
//! Content-management backend for a recipe-sharing platform.
//!
//! # Architecture
//!
//! - **Credential Store**: authentication and registration
//! - **Follow Graph**: directed follow relation with consistent degree counters
//! - **Recipe Catalog**: recipes, nutrition data, ingredient vocabulary
//! - **Review Engine**: reviews, likes, aggregated-rating recomputation
//! - **Analytics**: read-only rankings (calorie pairs, complexity, follow ratio)
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT, ensuring in-flight requests
//! complete and database connections close cleanly.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod database;
mod duration;
mod error;
mod pagination;
mod service;

use config::Config;
use database::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  RecipeGraph Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded and validated");

    // Initialize database connection pool
    let db = Database::new(&config.database).await?;
    info!("Database connection pool established");

    // Run migrations
    database::run_migrations(db.pool()).await?;
    info!("Database migrations applied");

    info!(
        "API listening on http://{}:{}",
        config.api.host, config.api.port
    );
    info!(
        "Health: http://{}:{}/health",
        config.api.host, config.api.port
    );

    // Serve until a shutdown signal arrives
    let result = api::start_server(db.pool().clone(), &config.api).await;

    info!("Shutting down...");
    db.close().await;
    info!("Shutdown complete");

    result
}

/// Initialize the tracing subscriber
///
/// Uses RUST_LOG environment variable for filtering, defaults to info level.
/// Set RUST_LOG=debug for verbose logging.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .init();
}
