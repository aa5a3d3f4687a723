/// Database models for FamHealth
///
/// One module per table group, each with its row types and queries.
///
/// # Example
///
/// ```no_run
/// use famhealth_shared::models::user::{User, CreateUser};
/// use famhealth_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "user@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     name: "Ann".to_string(),
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod advice;
pub mod allowed_email;
pub mod audit_log;
pub mod chat;
pub mod checkup;
pub mod document;
pub mod family;
pub mod member;
pub mod record;
pub mod system_config;
pub mod user;
pub mod vaccine;

/// Whether a query failed on a unique constraint
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
