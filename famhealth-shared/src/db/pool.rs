/// PostgreSQL connection pool
///
/// Connections identify themselves as `famhealth` in `pg_stat_activity`.
/// The pool is probed once before it is handed out, so a bad URL or a
/// server that refuses logins fails startup instead of the first request.
///
/// ```no_run
/// use famhealth_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), sqlx::Error> {
/// let pool = create_pool(DatabaseConfig::sized("postgresql://localhost/famhealth", 20)).await?;
/// # Ok(())
/// # }
/// ```

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{str::FromStr, time::Duration};
use tracing::{debug, info};

const APPLICATION_NAME: &str = "famhealth";

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,

    pub max_connections: u32,

    pub min_connections: u32,

    /// Seconds a request may wait for a free connection
    pub acquire_timeout_seconds: u64,

    /// Idle connections are closed after this many seconds
    pub idle_timeout_seconds: Option<u64>,

    /// Connections are recycled after this many seconds
    pub max_lifetime_seconds: Option<u64>,

    pub test_before_acquire: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
            test_before_acquire: true,
        }
    }
}

impl DatabaseConfig {
    /// Default settings pointed at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Default settings with an explicit upper bound; the warm floor never exceeds it
    pub fn sized(url: impl Into<String>, max_connections: u32) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            max_connections,
            min_connections: Self::default().min_connections.min(max_connections),
            ..Self::with_url(url)
        }
    }
}

/// Opens the pool and verifies it with [`health_check`]
pub async fn create_pool(config: DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "connecting to database"
    );

    let connect = PgConnectOptions::from_str(&config.url)?.application_name(APPLICATION_NAME);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .idle_timeout(config.idle_timeout_seconds.map(Duration::from_secs))
        .max_lifetime(config.max_lifetime_seconds.map(Duration::from_secs))
        .test_before_acquire(config.test_before_acquire)
        .connect_with(connect)
        .await?;

    health_check(&pool).await?;

    info!("database pool ready");
    Ok(pool)
}

/// Round-trips a trivial query through the pool
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    debug!("database answered ping");
    Ok(())
}

/// Snapshot of pool usage
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub active_connections: usize,
    pub idle_connections: usize,
    pub total_connections: usize,
}

pub fn get_pool_stats(pool: &PgPool) -> PoolStats {
    let total = pool.size() as usize;
    let idle = pool.num_idle();

    PoolStats {
        active_connections: total.saturating_sub(idle),
        idle_connections: idle,
        total_connections: total,
    }
}

/// Waits for checked-out connections and closes the pool
pub async fn close_pool(pool: PgPool) {
    pool.close().await;
    info!("database pool closed");
}
