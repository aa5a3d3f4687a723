/// Periodic checkup items and their completion records
///
/// An item is a recurring check (dental cleaning, annual exam) for one member,
/// repeated every `interval_months`. Each completed check adds a record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CheckItem {
    pub id: Uuid,
    pub member_id: Uuid,
    pub name: String,
    pub interval_months: i32,
    pub description: Option<String>,
    pub is_active: bool,
    pub skipped_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Item joined with the family of its member, for access checks
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OwnedCheckItem {
    #[sqlx(flatten)]
    pub item: CheckItem,
    pub family_id: Uuid,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    pub id: Uuid,
    pub item_id: Uuid,
    pub check_date: NaiveDate,
    pub location: Option<String>,
    pub doctor: Option<String>,
    pub findings: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCheckRecord {
    pub check_date: NaiveDate,
    pub location: Option<String>,
    pub doctor: Option<String>,
    pub findings: Option<String>,
    pub notes: Option<String>,
}

const ITEM_COLUMNS: &str =
    "id, member_id, name, interval_months, description, is_active, skipped_until, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, item_id, check_date, location, doctor, findings, notes, created_at";

impl CheckItem {
    pub async fn create(
        pool: &PgPool,
        member_id: Uuid,
        name: &str,
        interval_months: i32,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO periodic_check_items (member_id, name, interval_months, description)
             VALUES ($1, $2, $3, $4) RETURNING {ITEM_COLUMNS}"
        );

        sqlx::query_as::<_, CheckItem>(&sql)
            .bind(member_id)
            .bind(name)
            .bind(interval_months)
            .bind(description)
            .fetch_one(pool)
            .await
    }

    /// Item by id with its member's family, regardless of caller
    pub async fn find_owned(pool: &PgPool, id: Uuid) -> Result<Option<OwnedCheckItem>, sqlx::Error> {
        sqlx::query_as::<_, OwnedCheckItem>(
            r#"
            SELECT i.id, i.member_id, i.name, i.interval_months, i.description, i.is_active,
                   i.skipped_until, i.created_at, i.updated_at, m.family_id
            FROM periodic_check_items i
            JOIN family_members m ON m.id = i.member_id
            WHERE i.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Active items of a member, oldest first
    pub async fn list_active(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM periodic_check_items
             WHERE member_id = $1 AND is_active ORDER BY created_at ASC"
        );

        sqlx::query_as::<_, CheckItem>(&sql)
            .bind(member_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        name: Option<&str>,
        interval_months: Option<i32>,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE periodic_check_items SET
                name = COALESCE($2, name),
                interval_months = COALESCE($3, interval_months),
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        );

        sqlx::query_as::<_, CheckItem>(&sql)
            .bind(id)
            .bind(name)
            .bind(interval_months)
            .bind(description)
            .fetch_one(pool)
            .await
    }

    /// Sets or clears the skip date
    pub async fn set_skipped_until(pool: &PgPool, id: Uuid, until: Option<NaiveDate>) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "UPDATE periodic_check_items SET skipped_until = $2, updated_at = NOW()
             WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        );

        sqlx::query_as::<_, CheckItem>(&sql)
            .bind(id)
            .bind(until)
            .fetch_one(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM periodic_check_items WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl CheckRecord {
    /// Adds a completion record and clears the item's skip in one transaction
    pub async fn create(pool: &PgPool, item_id: Uuid, data: CreateCheckRecord) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let sql = format!(
            "INSERT INTO periodic_check_records (item_id, check_date, location, doctor, findings, notes)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {RECORD_COLUMNS}"
        );
        let record = sqlx::query_as::<_, CheckRecord>(&sql)
            .bind(item_id)
            .bind(data.check_date)
            .bind(data.location)
            .bind(data.doctor)
            .bind(data.findings)
            .bind(data.notes)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE periodic_check_items SET skipped_until = NULL, updated_at = NOW() WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(record)
    }

    /// Records of several items, newest check first
    pub async fn list_for_items(pool: &PgPool, item_ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM periodic_check_records
             WHERE item_id = ANY($1) ORDER BY check_date DESC, created_at DESC"
        );

        sqlx::query_as::<_, CheckRecord>(&sql)
            .bind(item_ids)
            .fetch_all(pool)
            .await
    }

    /// Deletes a record whose item belongs to a member of `family_id`
    pub async fn delete_in_family(pool: &PgPool, id: Uuid, family_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM periodic_check_records r
            USING periodic_check_items i, family_members m
            WHERE r.id = $1 AND i.id = r.item_id AND m.id = i.member_id AND m.family_id = $2
            "#,
        )
        .bind(id)
        .bind(family_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
