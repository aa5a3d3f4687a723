/// Schema migrations
///
/// The workspace `migrations/` directory is compiled into [`MIGRATOR`].
/// Files apply in version order and sqlx records each one in
/// `_sqlx_migrations`, so running them again at every startup is harmless.

use sqlx::{
    migrate::{MigrateDatabase, MigrateError, Migrator},
    postgres::PgPool,
    Postgres,
};
use tracing::{debug, error, info};

/// Every migration shipped with this build
pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Applied versus shipped migrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied_migrations: usize,
    pub embedded_migrations: usize,
    pub latest_version: Option<i64>,
}

impl MigrationStatus {
    /// Whether every shipped migration has been applied
    pub fn is_current(&self) -> bool {
        self.applied_migrations >= self.embedded_migrations
    }
}

/// Applies pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    info!(embedded = MIGRATOR.iter().count(), "applying schema migrations");

    MIGRATOR.run(pool).await.inspect_err(|e| {
        error!(error = %e, "schema migration failed");
    })?;

    info!("schema is up to date");
    Ok(())
}

/// Reads `_sqlx_migrations`; a database that never ran migrations reports zero
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let embedded_migrations = MIGRATOR.iter().count();

    let tracked: bool = sqlx::query_scalar("SELECT to_regclass('public._sqlx_migrations') IS NOT NULL")
        .fetch_one(pool)
        .await?;

    if !tracked {
        debug!("no migration bookkeeping table yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            embedded_migrations,
            latest_version: None,
        });
    }

    let (applied, latest_version): (i64, Option<i64>) =
        sqlx::query_as("SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success")
            .fetch_one(pool)
            .await?;

    Ok(MigrationStatus {
        applied_migrations: usize::try_from(applied).unwrap_or_default(),
        embedded_migrations,
        latest_version,
    })
}

/// Creates the database named in `database_url` when the server has none
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if Postgres::database_exists(database_url).await? {
        return Ok(());
    }

    info!("database missing, creating it");
    Postgres::create_database(database_url).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_cover_every_table_group() {
        let descriptions: Vec<_> = MIGRATOR.iter().map(|m| m.description.to_string()).collect();
        assert_eq!(descriptions.len(), 6);
        assert!(descriptions.iter().any(|d| d.contains("vaccinations and checkups")));
    }

    #[test]
    fn test_status_is_current() {
        let status = MigrationStatus {
            applied_migrations: 6,
            embedded_migrations: 6,
            latest_version: Some(20250101000006),
        };
        assert!(status.is_current());
        assert!(!MigrationStatus { applied_migrations: 5, ..status }.is_current());
    }
}
