/// Registration whitelist
///
/// When the table is non-empty only listed emails may register or log in.
/// Emails are stored trimmed and lowercased.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AllowedEmail {
    pub id: Uuid,
    pub email: String,
    pub added_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Canonical form used for storage and comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AllowedEmail {
    /// All entries, newest first
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AllowedEmail>(
            "SELECT id, email, added_by, created_at FROM allowed_emails ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM allowed_emails")
            .fetch_one(executor)
            .await
    }

    pub async fn contains<'e, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM allowed_emails WHERE email = $1)")
            .bind(normalize_email(email))
            .fetch_one(executor)
            .await
    }

    /// Inserts an email; fails with a unique violation if present
    pub async fn add(pool: &PgPool, email: &str, added_by: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AllowedEmail>(
            "INSERT INTO allowed_emails (email, added_by) VALUES ($1, $2)
             RETURNING id, email, added_by, created_at",
        )
        .bind(normalize_email(email))
        .bind(added_by)
        .fetch_one(pool)
        .await
    }

    /// Inserts an email unless it is already listed; returns whether it was added
    pub async fn add_if_missing<'e, E>(executor: E, email: &str, added_by: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "INSERT INTO allowed_emails (email, added_by) VALUES ($1, $2) ON CONFLICT (email) DO NOTHING",
        )
        .bind(normalize_email(email))
        .bind(added_by)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM allowed_emails WHERE email = $1")
            .bind(normalize_email(email))
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ann@Example.COM "), "ann@example.com");
    }
}
