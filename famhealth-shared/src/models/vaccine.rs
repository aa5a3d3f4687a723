/// Vaccination records, skips and family-defined vaccines
///
/// Records are unique per (member, vaccine name, dose). A skip marks a vaccine
/// as deliberately not taken, either for one flu season (`2024-2025`) or for
/// good (`lifetime`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VaccineRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub vaccine_code: Option<String>,
    pub vaccine_name: String,
    pub dose_number: i32,
    pub total_doses: Option<i32>,
    pub vaccinated_at: NaiveDate,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
    pub batch_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_name: String,
}

#[derive(Debug, Clone)]
pub struct CreateVaccineRecord {
    pub member_id: Uuid,
    pub vaccine_code: Option<String>,
    pub vaccine_name: String,
    pub dose_number: i32,
    pub total_doses: Option<i32>,
    pub vaccinated_at: NaiveDate,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
    pub batch_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateVaccineRecord {
    pub vaccine_code: Option<String>,
    pub vaccine_name: Option<String>,
    pub dose_number: Option<i32>,
    pub total_doses: Option<i32>,
    pub vaccinated_at: Option<NaiveDate>,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
    pub batch_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VaccineSkip {
    pub id: Uuid,
    pub member_id: Uuid,
    pub vaccine_code: String,
    pub season_label: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VaccineFrequency {
    Once,
    Yearly,
    MultiDose,
}

impl VaccineFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaccineFrequency::Once => "ONCE",
            VaccineFrequency::Yearly => "YEARLY",
            VaccineFrequency::MultiDose => "MULTI_DOSE",
        }
    }
}

impl TryFrom<String> for VaccineFrequency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "ONCE" => Ok(VaccineFrequency::Once),
            "YEARLY" => Ok(VaccineFrequency::Yearly),
            "MULTI_DOSE" => Ok(VaccineFrequency::MultiDose),
            other => Err(format!("unknown vaccine frequency: {other}")),
        }
    }
}

/// Vaccine defined by a family in addition to the built-in list
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomVaccine {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub frequency: VaccineFrequency,
    pub total_doses: i32,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RECORD_SELECT: &str = r#"
    SELECT v.id, v.member_id, v.vaccine_code, v.vaccine_name, v.dose_number, v.total_doses,
           v.vaccinated_at, v.location, v.manufacturer, v.batch_number, v.notes,
           v.created_at, v.updated_at, m.name AS member_name
    FROM vaccine_records v
    JOIN family_members m ON m.id = v.member_id
"#;

const SKIP_COLUMNS: &str = "id, member_id, vaccine_code, season_label, reason, created_at";

const CUSTOM_COLUMNS: &str = "id, family_id, name, frequency, total_doses, description, created_at";

impl VaccineRecord {
    pub async fn create(pool: &PgPool, data: CreateVaccineRecord) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO vaccine_records
                (member_id, vaccine_code, vaccine_name, dose_number, total_doses, vaccinated_at,
                 location, manufacturer, batch_number, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(data.member_id)
        .bind(data.vaccine_code)
        .bind(data.vaccine_name)
        .bind(data.dose_number)
        .bind(data.total_doses)
        .bind(data.vaccinated_at)
        .bind(data.location)
        .bind(data.manufacturer)
        .bind(data.batch_number)
        .bind(data.notes)
        .fetch_one(pool)
        .await
    }

    pub async fn find_in_family(pool: &PgPool, id: Uuid, family_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("{RECORD_SELECT} WHERE v.id = $1 AND m.family_id = $2 AND m.deleted_at IS NULL");

        sqlx::query_as::<_, VaccineRecord>(&sql)
            .bind(id)
            .bind(family_id)
            .fetch_optional(pool)
            .await
    }

    /// Family records, most recent vaccination first
    pub async fn list(pool: &PgPool, family_id: Uuid, member_id: Option<Uuid>) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{RECORD_SELECT}
            WHERE m.family_id = $1 AND m.deleted_at IS NULL
              AND ($2::uuid IS NULL OR v.member_id = $2)
            ORDER BY v.vaccinated_at DESC, v.created_at DESC
            "#
        );

        sqlx::query_as::<_, VaccineRecord>(&sql)
            .bind(family_id)
            .bind(member_id)
            .fetch_all(pool)
            .await
    }

    /// All records of one member, oldest vaccination first
    pub async fn list_for_member(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!("{RECORD_SELECT} WHERE v.member_id = $1 ORDER BY v.vaccinated_at ASC, v.dose_number ASC");

        sqlx::query_as::<_, VaccineRecord>(&sql)
            .bind(member_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count_for_family(pool: &PgPool, family_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM vaccine_records v JOIN family_members m ON m.id = v.member_id
             WHERE m.family_id = $1 AND m.deleted_at IS NULL",
        )
        .bind(family_id)
        .fetch_one(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateVaccineRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE vaccine_records SET
                vaccine_code = COALESCE($2, vaccine_code),
                vaccine_name = COALESCE($3, vaccine_name),
                dose_number = COALESCE($4, dose_number),
                total_doses = COALESCE($5, total_doses),
                vaccinated_at = COALESCE($6, vaccinated_at),
                location = COALESCE($7, location),
                manufacturer = COALESCE($8, manufacturer),
                batch_number = COALESCE($9, batch_number),
                notes = COALESCE($10, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(data.vaccine_code)
        .bind(data.vaccine_name)
        .bind(data.dose_number)
        .bind(data.total_doses)
        .bind(data.vaccinated_at)
        .bind(data.location)
        .bind(data.manufacturer)
        .bind(data.batch_number)
        .bind(data.notes)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM vaccine_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl VaccineSkip {
    pub async fn create(
        pool: &PgPool,
        member_id: Uuid,
        vaccine_code: &str,
        season_label: &str,
        reason: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO vaccine_skips (member_id, vaccine_code, season_label, reason)
             VALUES ($1, $2, $3, $4) RETURNING {SKIP_COLUMNS}"
        );

        sqlx::query_as::<_, VaccineSkip>(&sql)
            .bind(member_id)
            .bind(vaccine_code)
            .bind(season_label)
            .bind(reason)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_member(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!("SELECT {SKIP_COLUMNS} FROM vaccine_skips WHERE member_id = $1");

        sqlx::query_as::<_, VaccineSkip>(&sql)
            .bind(member_id)
            .fetch_all(pool)
            .await
    }

    /// Deletes a skip whose member belongs to `family_id`
    pub async fn delete_in_family(pool: &PgPool, id: Uuid, family_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM vaccine_skips s
            USING family_members m
            WHERE s.id = $1 AND m.id = s.member_id AND m.family_id = $2 AND m.deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(family_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl CustomVaccine {
    pub async fn create(
        pool: &PgPool,
        family_id: Uuid,
        name: &str,
        frequency: VaccineFrequency,
        total_doses: i32,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO custom_vaccines (family_id, name, frequency, total_doses, description)
             VALUES ($1, $2, $3, $4, $5) RETURNING {CUSTOM_COLUMNS}"
        );

        sqlx::query_as::<_, CustomVaccine>(&sql)
            .bind(family_id)
            .bind(name.trim())
            .bind(frequency.as_str())
            .bind(total_doses)
            .bind(description)
            .fetch_one(pool)
            .await
    }

    pub async fn list(pool: &PgPool, family_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!("SELECT {CUSTOM_COLUMNS} FROM custom_vaccines WHERE family_id = $1 ORDER BY created_at ASC");

        sqlx::query_as::<_, CustomVaccine>(&sql)
            .bind(family_id)
            .fetch_all(pool)
            .await
    }

    pub async fn delete_in_family(pool: &PgPool, id: Uuid, family_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM custom_vaccines WHERE id = $1 AND family_id = $2")
            .bind(id)
            .bind(family_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
