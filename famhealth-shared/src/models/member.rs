/// Family member model and database operations
///
/// A member is a person whose health data is tracked. Members belong to
/// exactly one family and may optionally be linked to one user account.
/// Deletion is soft: `deleted_at` is set and the row is hidden from every
/// listing.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE family_members (
///     id UUID PRIMARY KEY,
///     family_id UUID NOT NULL REFERENCES families(id),
///     user_id UUID UNIQUE REFERENCES users(id),
///     name VARCHAR(100) NOT NULL,
///     relationship relationship NOT NULL,
///     gender gender NOT NULL,
///     birth_date DATE NOT NULL,
///     avatar VARCHAR(500),
///     blood_type blood_type NOT NULL DEFAULT 'UNKNOWN',
///     height DOUBLE PRECISION,
///     weight DOUBLE PRECISION,
///     chronic_diseases TEXT[] NOT NULL DEFAULT '{}',
///     allergies TEXT,
///     notes TEXT,
///     deleted_at TIMESTAMPTZ,
///     ...
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use famhealth_shared::models::member::{CreateMember, FamilyMember, Gender, Relationship};
/// use chrono::NaiveDate;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, family_id: Uuid) -> Result<(), sqlx::Error> {
/// let member = FamilyMember::create(&pool, family_id, CreateMember {
///     name: "Grandma".to_string(),
///     relationship: Relationship::Grandmother,
///     gender: Gender::Female,
///     birth_date: NaiveDate::from_ymd_opt(1950, 3, 1).unwrap(),
///     ..Default::default()
/// }).await?;
///
/// let listed = FamilyMember::list_with_counts(&pool, family_id).await?;
/// assert!(listed.iter().any(|m| m.member.id == member.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// How a member relates to the family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "relationship", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    #[sqlx(rename = "SELF")]
    #[serde(rename = "SELF")]
    Myself,
    Spouse,
    Father,
    Mother,
    Son,
    Daughter,
    Grandfather,
    Grandmother,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    /// Label used in prompts
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "男",
            Gender::Female => "女",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "blood_type")]
pub enum BloodType {
    A,
    B,
    AB,
    O,
    #[sqlx(rename = "UNKNOWN")]
    #[serde(rename = "UNKNOWN")]
    #[default]
    Unknown,
}

impl BloodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::A => "A",
            BloodType::B => "B",
            BloodType::AB => "AB",
            BloodType::O => "O",
            BloodType::Unknown => "UNKNOWN",
        }
    }
}

/// Family member row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    pub id: Uuid,
    pub family_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub relationship: Relationship,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub avatar: Option<String>,
    pub blood_type: BloodType,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub chronic_diseases: Vec<String>,
    pub allergies: Option<String>,
    pub notes: Option<String>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Member row plus the counters shown in listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MemberWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub member: FamilyMember,
    pub document_count: i64,
    pub record_count: i64,
    pub advice_count: i64,
}

/// Aggregate counters for a whole family
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FamilyStats {
    pub member_count: i64,
    pub document_count: i64,
    pub record_count: i64,
    pub advice_count: i64,
}

/// Input for creating a member
#[derive(Debug, Clone, Default)]
pub struct CreateMember {
    pub name: String,
    pub relationship: Relationship,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub avatar: Option<String>,
    pub blood_type: Option<BloodType>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub chronic_diseases: Vec<String>,
    pub allergies: Option<String>,
    pub notes: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Partial update; `None` leaves a column unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateMember {
    pub name: Option<String>,
    pub relationship: Option<Relationship>,
    pub gender: Option<Gender>,
    pub birth_date: Option<NaiveDate>,
    pub avatar: Option<String>,
    pub blood_type: Option<BloodType>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub chronic_diseases: Option<Vec<String>>,
    pub allergies: Option<String>,
    pub notes: Option<String>,
}

const MEMBER_COLUMNS: &str = "id, family_id, user_id, name, relationship, gender, birth_date, \
     avatar, blood_type, height, weight, chronic_diseases, allergies, notes, \
     deleted_at, created_at, updated_at";

const COUNT_COLUMNS: &str = "
    (SELECT COUNT(*) FROM health_documents d WHERE d.member_id = m.id AND d.deleted_at IS NULL) AS document_count,
    (SELECT COUNT(*) FROM health_records r WHERE r.member_id = m.id) AS record_count,
    (SELECT COUNT(*) FROM health_advice a WHERE a.member_id = m.id) AS advice_count";

impl FamilyMember {
    /// Age in whole years on `today`
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        crate::domain::age::years_between(self.birth_date, today)
    }

    pub async fn create<'e, E>(executor: E, family_id: Uuid, data: CreateMember) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            r#"
            INSERT INTO family_members (
                family_id, user_id, name, relationship, gender, birth_date, avatar,
                blood_type, height, weight, chronic_diseases, allergies, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {MEMBER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, FamilyMember>(&sql)
            .bind(family_id)
            .bind(data.user_id)
            .bind(data.name)
            .bind(data.relationship)
            .bind(data.gender)
            .bind(data.birth_date)
            .bind(data.avatar)
            .bind(data.blood_type.unwrap_or_default())
            .bind(data.height)
            .bind(data.weight)
            .bind(data.chronic_diseases)
            .bind(data.allergies)
            .bind(data.notes)
            .fetch_one(executor)
            .await
    }

    /// Finds a live (not soft-deleted) member by id
    pub async fn find_live<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM family_members WHERE id = $1 AND deleted_at IS NULL");

        sqlx::query_as::<_, FamilyMember>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Member linked to a user account, if any
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM family_members WHERE user_id = $1 AND deleted_at IS NULL");

        sqlx::query_as::<_, FamilyMember>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Live members of a family, with counters, ordered by relationship then age of the row
    pub async fn list_with_counts(pool: &PgPool, family_id: Uuid) -> Result<Vec<MemberWithCounts>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {MEMBER_COLUMNS}, {COUNT_COLUMNS}
            FROM family_members m
            WHERE m.family_id = $1 AND m.deleted_at IS NULL
            ORDER BY m.relationship ASC, m.created_at ASC
            "#
        );

        sqlx::query_as::<_, MemberWithCounts>(&sql)
            .bind(family_id)
            .fetch_all(pool)
            .await
    }

    /// Live members of a family without counters
    pub async fn list_by_family(pool: &PgPool, family_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM family_members
             WHERE family_id = $1 AND deleted_at IS NULL
             ORDER BY relationship ASC, created_at ASC"
        );

        sqlx::query_as::<_, FamilyMember>(&sql)
            .bind(family_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_with_counts(pool: &PgPool, id: Uuid) -> Result<Option<MemberWithCounts>, sqlx::Error> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS}, {COUNT_COLUMNS}
             FROM family_members m
             WHERE m.id = $1 AND m.deleted_at IS NULL"
        );

        sqlx::query_as::<_, MemberWithCounts>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Counts live members in a family
    pub async fn count_by_family(pool: &PgPool, family_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM family_members WHERE family_id = $1 AND deleted_at IS NULL")
            .bind(family_id)
            .fetch_one(pool)
            .await
    }

    /// Family-wide counters for the dashboard
    pub async fn family_stats(pool: &PgPool, family_id: Uuid) -> Result<FamilyStats, sqlx::Error> {
        sqlx::query_as::<_, FamilyStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM family_members m
                  WHERE m.family_id = $1 AND m.deleted_at IS NULL) AS member_count,
                (SELECT COUNT(*) FROM health_documents d JOIN family_members m ON m.id = d.member_id
                  WHERE m.family_id = $1 AND m.deleted_at IS NULL AND d.deleted_at IS NULL) AS document_count,
                (SELECT COUNT(*) FROM health_records r JOIN family_members m ON m.id = r.member_id
                  WHERE m.family_id = $1 AND m.deleted_at IS NULL) AS record_count,
                (SELECT COUNT(*) FROM health_advice a JOIN family_members m ON m.id = a.member_id
                  WHERE m.family_id = $1 AND m.deleted_at IS NULL) AS advice_count
            "#,
        )
        .bind(family_id)
        .fetch_one(pool)
        .await
    }

    /// Whether the family already has a live SELF member other than `exclude`
    pub async fn self_exists(pool: &PgPool, family_id: Uuid, exclude: Option<Uuid>) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM family_members
                WHERE family_id = $1 AND relationship = 'SELF' AND deleted_at IS NULL
                  AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(family_id)
        .bind(exclude)
        .fetch_one(pool)
        .await
    }

    /// Applies a partial update and returns the new row
    pub async fn update<'e, E>(executor: E, id: Uuid, data: UpdateMember) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            r#"
            UPDATE family_members SET
                name = COALESCE($2, name),
                relationship = COALESCE($3, relationship),
                gender = COALESCE($4, gender),
                birth_date = COALESCE($5, birth_date),
                avatar = COALESCE($6, avatar),
                blood_type = COALESCE($7, blood_type),
                height = COALESCE($8, height),
                weight = COALESCE($9, weight),
                chronic_diseases = COALESCE($10, chronic_diseases),
                allergies = COALESCE($11, allergies),
                notes = COALESCE($12, notes),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {MEMBER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, FamilyMember>(&sql)
            .bind(id)
            .bind(data.name)
            .bind(data.relationship)
            .bind(data.gender)
            .bind(data.birth_date)
            .bind(data.avatar)
            .bind(data.blood_type)
            .bind(data.height)
            .bind(data.weight)
            .bind(data.chronic_diseases)
            .bind(data.allergies)
            .bind(data.notes)
            .fetch_one(executor)
            .await
    }

    /// Copies a new body measurement onto the member profile
    pub async fn set_body_measure<'e, E>(
        executor: E,
        id: Uuid,
        height: Option<f64>,
        weight: Option<f64>,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE family_members
            SET height = COALESCE($2, height), weight = COALESCE($3, weight), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(height)
        .bind(weight)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE family_members SET deleted_at = NOW(), user_id = NULL, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-deletes every member of a family together with their documents
    pub async fn soft_delete_family<'e, E>(executor: E, family_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            WITH gone AS (
                UPDATE family_members SET deleted_at = NOW(), user_id = NULL, updated_at = NOW()
                WHERE family_id = $1 AND deleted_at IS NULL
                RETURNING id
            )
            UPDATE health_documents SET deleted_at = NOW(), updated_at = NOW()
            WHERE member_id IN (SELECT id FROM gone) AND deleted_at IS NULL
            "#,
        )
        .bind(family_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn link_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE family_members SET user_id = $2, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {MEMBER_COLUMNS}"
        );

        sqlx::query_as::<_, FamilyMember>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Clears the link from whichever member points at `user_id`
    pub async fn unlink_user<'e, E>(executor: E, user_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE family_members SET user_id = NULL, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_self_serializes_as_self() {
        let json = serde_json::to_string(&Relationship::Myself).unwrap();
        assert_eq!(json, "\"SELF\"");

        let parsed: Relationship = serde_json::from_str("\"GRANDMOTHER\"").unwrap();
        assert_eq!(parsed, Relationship::Grandmother);
    }

    #[test]
    fn test_blood_type_wire_names() {
        assert_eq!(serde_json::to_string(&BloodType::AB).unwrap(), "\"AB\"");
        assert_eq!(serde_json::to_string(&BloodType::Unknown).unwrap(), "\"UNKNOWN\"");
        assert_eq!(BloodType::default(), BloodType::Unknown);
    }

    #[test]
    fn test_gender_label() {
        assert_eq!(Gender::Male.label(), "男");
        assert_eq!(Gender::Female.label(), "女");
    }

    #[test]
    fn test_update_member_default_is_noop() {
        let update = UpdateMember::default();
        assert!(update.name.is_none());
        assert!(update.relationship.is_none());
        assert!(update.chronic_diseases.is_none());
    }
}
