/// Database layer
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with health checks and stats
/// - `migrations`: embedded schema migrations from the workspace `migrations/` directory
///
/// Row types and queries live in the crate-level `models` module.
///
/// # Example
///
/// ```no_run
/// use famhealth_shared::db::{migrations::run_migrations, pool::{create_pool, DatabaseConfig}};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::with_url(std::env::var("DATABASE_URL")?)).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
