/// Key/value settings editable at runtime by administrators
///
/// Used for AI provider credentials and model names that override the
/// environment.

use sqlx::PgPool;

pub const DASHSCOPE_API_KEY: &str = "dashscope_api_key";
pub const GOOGLE_API_KEY: &str = "google_api_key";
pub const AI_PROVIDER: &str = "ai_provider";
pub const DASHSCOPE_MODEL: &str = "dashscope_model";
pub const GEMINI_MODEL: &str = "gemini_model";

pub struct SystemConfig;

impl SystemConfig {
    pub async fn get(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM system_config WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Non-empty value for `key`, if one is stored
    pub async fn get_non_empty(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
        Ok(Self::get(pool, key).await?.filter(|v| !v.trim().is_empty()))
    }

    pub async fn set(pool: &PgPool, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO system_config (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM system_config WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
