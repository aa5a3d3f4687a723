/// Health record (vital sign / lab value) model
///
/// One row per measurement. `is_abnormal` is computed from the reference
/// range when the row is written and stored alongside the value.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE health_records (
///     id UUID PRIMARY KEY,
///     member_id UUID NOT NULL REFERENCES family_members(id),
///     document_id UUID REFERENCES health_documents(id),
///     record_date TIMESTAMPTZ NOT NULL,
///     record_type record_type NOT NULL,
///     value DOUBLE PRECISION NOT NULL,
///     unit VARCHAR(20) NOT NULL,
///     context measurement_context NOT NULL DEFAULT 'OTHER',
///     is_abnormal BOOLEAN NOT NULL,
///     notes VARCHAR(500),
///     source VARCHAR(20) NOT NULL DEFAULT 'MANUAL',
///     ...
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "record_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Height,
    Weight,
    Waist,
    SystolicBp,
    DiastolicBp,
    HeartRate,
    FastingGlucose,
    PostprandialGlucose,
    #[sqlx(rename = "HBA1C")]
    #[serde(rename = "HBA1C")]
    Hba1c,
    TotalCholesterol,
    Triglycerides,
    Hdl,
    Ldl,
    Temperature,
    BloodOxygen,
}

/// When the measurement was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "measurement_context", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementContext {
    Morning,
    BeforeMeal,
    AfterMeal,
    AfterExercise,
    BeforeSleep,
    #[default]
    Other,
}

/// Health record row joined with the owning member's name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub document_id: Option<Uuid>,
    pub record_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub value: f64,
    pub unit: String,
    pub context: MeasurementContext,
    pub is_abnormal: bool,
    pub notes: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub member_name: String,
}

/// Input for one record
#[derive(Debug, Clone)]
pub struct CreateRecord {
    pub member_id: Uuid,
    pub record_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub value: f64,
    pub unit: String,
    pub context: MeasurementContext,
    pub notes: Option<String>,
}

/// Filter for record listings; every field is optional
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub member_id: Option<Uuid>,
    pub record_type: Option<RecordType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

const RECORD_SELECT: &str = r#"
    SELECT r.id, r.member_id, r.document_id, r.record_date, r.record_type, r.value, r.unit,
           r.context, r.is_abnormal, r.notes, r.source, r.created_at, m.name AS member_name
    FROM health_records r
    JOIN family_members m ON m.id = r.member_id
"#;

impl HealthRecord {
    /// Inserts a record; the abnormal flag is derived from the reference range
    pub async fn create<'e, E>(executor: E, data: CreateRecord) -> Result<Uuid, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let is_abnormal = data.record_type.is_abnormal(data.value);

        sqlx::query_scalar(
            r#"
            INSERT INTO health_records (member_id, record_date, record_type, value, unit, context, is_abnormal, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(data.member_id)
        .bind(data.record_date)
        .bind(data.record_type)
        .bind(data.value)
        .bind(data.unit)
        .bind(data.context)
        .bind(is_abnormal)
        .bind(data.notes)
        .fetch_one(executor)
        .await
    }

    /// Finds a record whose member belongs to `family_id`
    pub async fn find_in_family(pool: &PgPool, id: Uuid, family_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("{RECORD_SELECT} WHERE r.id = $1 AND m.family_id = $2 AND m.deleted_at IS NULL");

        sqlx::query_as::<_, HealthRecord>(&sql)
            .bind(id)
            .bind(family_id)
            .fetch_optional(pool)
            .await
    }

    /// Family-scoped listing, newest first
    pub async fn list(pool: &PgPool, family_id: Uuid, filter: &RecordFilter) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{RECORD_SELECT}
            WHERE m.family_id = $1 AND m.deleted_at IS NULL
              AND ($2::uuid IS NULL OR r.member_id = $2)
              AND ($3::record_type IS NULL OR r.record_type = $3)
              AND ($4::timestamptz IS NULL OR r.record_date >= $4)
              AND ($5::timestamptz IS NULL OR r.record_date <= $5)
            ORDER BY r.record_date DESC
            "#
        );

        sqlx::query_as::<_, HealthRecord>(&sql)
            .bind(family_id)
            .bind(filter.member_id)
            .bind(filter.record_type)
            .bind(filter.start)
            .bind(filter.end)
            .fetch_all(pool)
            .await
    }

    /// One series for charting, oldest first
    pub async fn trend(
        pool: &PgPool,
        member_id: Uuid,
        record_type: RecordType,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{RECORD_SELECT}
            WHERE r.member_id = $1 AND r.record_type = $2
              AND ($3::timestamptz IS NULL OR r.record_date >= $3)
            ORDER BY r.record_date ASC
            "#
        );

        sqlx::query_as::<_, HealthRecord>(&sql)
            .bind(member_id)
            .bind(record_type)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    /// Records of one member since `since`, newest first
    pub async fn recent_for_member(
        pool: &PgPool,
        member_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{RECORD_SELECT}
            WHERE r.member_id = $1 AND ($2::timestamptz IS NULL OR r.record_date >= $2)
            ORDER BY r.record_date DESC
            LIMIT $3
            "#
        );

        sqlx::query_as::<_, HealthRecord>(&sql)
            .bind(member_id)
            .bind(since)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Records of a member created after `after` (all when `None`)
    pub async fn count_created_since(
        pool: &PgPool,
        member_id: Uuid,
        after: Option<DateTime<Utc>>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM health_records
             WHERE member_id = $1 AND ($2::timestamptz IS NULL OR created_at > $2)",
        )
        .bind(member_id)
        .bind(after)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM health_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_wire_names() {
        assert_eq!(serde_json::to_string(&RecordType::SystolicBp).unwrap(), "\"SYSTOLIC_BP\"");
        assert_eq!(serde_json::to_string(&RecordType::Hba1c).unwrap(), "\"HBA1C\"");
        let parsed: RecordType = serde_json::from_str("\"POSTPRANDIAL_GLUCOSE\"").unwrap();
        assert_eq!(parsed, RecordType::PostprandialGlucose);
    }

    #[test]
    fn test_context_defaults_to_other() {
        assert_eq!(MeasurementContext::default(), MeasurementContext::Other);
        assert_eq!(
            serde_json::to_string(&MeasurementContext::AfterExercise).unwrap(),
            "\"AFTER_EXERCISE\""
        );
    }
}
