/// Generated health advice
///
/// Each row stores the parsed advice body, the score pulled out of it for
/// sorting, and a snapshot of the inputs the model saw.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::advice::AdviceContent;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HealthAdvice {
    pub id: Uuid,
    pub member_id: Uuid,
    pub content: Json<AdviceContent>,
    pub health_score: Option<i32>,
    pub data_snapshot: serde_json::Value,
    pub model_used: String,
    pub tokens_used: i32,
    pub generated_at: DateTime<Utc>,
    pub member_name: String,
    pub family_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CreateAdvice {
    pub member_id: Uuid,
    pub content: AdviceContent,
    pub data_snapshot: serde_json::Value,
    pub model_used: String,
    pub tokens_used: i32,
}

const ADVICE_SELECT: &str = r#"
    SELECT a.id, a.member_id, a.content, a.health_score, a.data_snapshot, a.model_used,
           a.tokens_used, a.generated_at, m.name AS member_name, m.family_id
    FROM health_advice a
    JOIN family_members m ON m.id = a.member_id
"#;

impl HealthAdvice {
    pub async fn create(pool: &PgPool, data: CreateAdvice) -> Result<Uuid, sqlx::Error> {
        let score = data.content.health_score;

        sqlx::query_scalar(
            r#"
            INSERT INTO health_advice (member_id, content, health_score, data_snapshot, model_used, tokens_used)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(data.member_id)
        .bind(Json(data.content))
        .bind(score)
        .bind(data.data_snapshot)
        .bind(data.model_used)
        .bind(data.tokens_used)
        .fetch_one(pool)
        .await
    }

    /// Advice by id together with its member's family
    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("{ADVICE_SELECT} WHERE a.id = $1 AND m.deleted_at IS NULL");

        sqlx::query_as::<_, HealthAdvice>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Latest advice across a family, optionally for one member
    pub async fn list(
        pool: &PgPool,
        family_id: Uuid,
        member_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{ADVICE_SELECT}
            WHERE m.family_id = $1 AND m.deleted_at IS NULL
              AND ($2::uuid IS NULL OR a.member_id = $2)
            ORDER BY a.generated_at DESC
            LIMIT $3
            "#
        );

        sqlx::query_as::<_, HealthAdvice>(&sql)
            .bind(family_id)
            .bind(member_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// When advice was last generated for a member
    pub async fn last_generated_at(pool: &PgPool, member_id: Uuid) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar("SELECT MAX(generated_at) FROM health_advice WHERE member_id = $1")
            .bind(member_id)
            .fetch_one(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM health_advice WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
