//! # Family Health API Server
//!
//! Serves the family health REST API: accounts and families, members,
//! health records, documents with OCR, vaccinations, checkups, AI advice
//! and chat.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/famhealth JWT_SECRET=... cargo run -p famhealth-api
//! ```

use famhealth_api::{
    app::{build_router, AppState},
    config::Config,
    routes,
};
use famhealth_shared::db::{
    migrations::{ensure_database_exists, get_migration_status, run_migrations},
    pool::{close_pool, create_pool, DatabaseConfig},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Family health API v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.storage.upload_dir).await?;

    ensure_database_exists(&config.database.url).await?;
    let pool = create_pool(DatabaseConfig::sized(
        config.database.url.clone(),
        config.database.max_connections,
    ))
    .await?;
    run_migrations(&pool).await?;
    let schema = get_migration_status(&pool).await?;
    tracing::info!(
        applied = schema.applied_migrations,
        version = ?schema.latest_version,
        "database ready"
    );

    let seeded = routes::whitelist::seed(&pool, &config).await?;
    if seeded > 0 {
        tracing::info!(count = seeded, "seeded whitelist");
    }

    if config.ai.dashscope_api_key.is_none() {
        tracing::warn!("DASHSCOPE_API_KEY not set, AI features need settings from the database");
    }

    let address = config.bind_address();
    let state = AppState::new(pool.clone(), config);
    let app = build_router(state);

    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "famhealth_api=debug,famhealth_shared=info,tower_http=debug".into());

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
