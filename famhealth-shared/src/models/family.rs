/// Family (household) model
///
/// A family scopes every member, document and record. Users join with the
/// family's 8-character invite code. A family whose last user leaves is
/// soft-deleted so its members and health data stay on disk.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE families (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(100) NOT NULL,
///     invite_code VARCHAR(8) NOT NULL UNIQUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    pub id: Uuid,
    pub name: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of the administrator overview
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FamilyOverview {
    pub family_id: Uuid,
    pub family_name: String,
    pub creator_email: Option<String>,
    pub creator_name: Option<String>,
    pub member_count: i64,
    pub document_count: i64,
    pub record_count: i64,
    pub advice_count: i64,
    pub created_at: DateTime<Utc>,
}

const FAMILY_COLUMNS: &str = "id, name, invite_code, created_at, updated_at";

impl Family {
    pub async fn create<'e, E>(executor: E, name: &str, invite_code: &str) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!("INSERT INTO families (name, invite_code) VALUES ($1, $2) RETURNING {FAMILY_COLUMNS}");

        sqlx::query_as::<_, Family>(&sql)
            .bind(name)
            .bind(invite_code)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {FAMILY_COLUMNS} FROM families WHERE id = $1 AND deleted_at IS NULL");

        sqlx::query_as::<_, Family>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Looks up a family by invite code (codes are stored uppercase)
    pub async fn find_by_invite_code(pool: &PgPool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {FAMILY_COLUMNS} FROM families WHERE invite_code = $1 AND deleted_at IS NULL");

        sqlx::query_as::<_, Family>(&sql)
            .bind(code.trim().to_uppercase())
            .fetch_optional(pool)
            .await
    }

    pub async fn invite_code_exists(pool: &PgPool, code: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM families WHERE invite_code = $1)")
            .bind(code)
            .fetch_one(pool)
            .await
    }

    pub async fn update_name(pool: &PgPool, id: Uuid, name: &str) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE families SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING {FAMILY_COLUMNS}"
        );

        sqlx::query_as::<_, Family>(&sql)
            .bind(id)
            .bind(name)
            .fetch_one(pool)
            .await
    }

    pub async fn update_invite_code(pool: &PgPool, id: Uuid, code: &str) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE families SET invite_code = $2, updated_at = NOW() WHERE id = $1 RETURNING {FAMILY_COLUMNS}"
        );

        sqlx::query_as::<_, Family>(&sql)
            .bind(id)
            .bind(code)
            .fetch_one(pool)
            .await
    }

    /// Hides the family from every lookup; rows that reference it are untouched
    pub async fn soft_delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE families SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every family with its creator and content counters, newest first
    ///
    /// The creator is the current owner account if one remains.
    pub async fn admin_overview(pool: &PgPool) -> Result<Vec<FamilyOverview>, sqlx::Error> {
        sqlx::query_as::<_, FamilyOverview>(
            r#"
            SELECT
                f.id AS family_id,
                f.name AS family_name,
                owner.email AS creator_email,
                owner.name AS creator_name,
                (SELECT COUNT(*) FROM family_members m
                  WHERE m.family_id = f.id AND m.deleted_at IS NULL) AS member_count,
                (SELECT COUNT(*) FROM health_documents d JOIN family_members m ON m.id = d.member_id
                  WHERE m.family_id = f.id AND d.deleted_at IS NULL) AS document_count,
                (SELECT COUNT(*) FROM health_records r JOIN family_members m ON m.id = r.member_id
                  WHERE m.family_id = f.id) AS record_count,
                (SELECT COUNT(*) FROM health_advice a JOIN family_members m ON m.id = a.member_id
                  WHERE m.family_id = f.id) AS advice_count,
                f.created_at
            FROM families f
            LEFT JOIN LATERAL (
                SELECT u.email, u.name FROM users u
                WHERE u.family_id = f.id
                ORDER BY u.is_owner DESC, u.created_at ASC
                LIMIT 1
            ) owner ON TRUE
            WHERE f.deleted_at IS NULL
            ORDER BY f.created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }
}
