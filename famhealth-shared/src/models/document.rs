/// Health document model
///
/// A document groups one or more uploaded files (exam reports, lab sheets,
/// prescriptions) for a member. It also carries the OCR text extracted from
/// the first image and the markdown produced by formatting that text.
///
/// # Processing states
///
/// Both `ocr_status` and `analyze_status` move through
/// `pending → processing → completed | failed`.
///
/// # Example
///
/// ```no_run
/// use famhealth_shared::models::document::{HealthDocument, ProcessingStatus};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, id: Uuid) -> Result<(), sqlx::Error> {
/// HealthDocument::set_ocr_progress(&pool, id, ProcessingStatus::Processing, 40).await?;
/// HealthDocument::finish_ocr(&pool, id, "血常规 ...").await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::member::Relationship;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    PhysicalExam,
    LabReport,
    ImagingReport,
    MedicalRecord,
    Prescription,
    Other,
}

impl DocumentType {
    /// Rank used when choosing which analyzed document to quote; lower wins
    pub fn priority(&self) -> u8 {
        match self {
            DocumentType::PhysicalExam => 1,
            DocumentType::LabReport => 2,
            DocumentType::MedicalRecord => 3,
            DocumentType::ImagingReport => 4,
            DocumentType::Prescription => 5,
            DocumentType::Other => 6,
        }
    }
}

/// OCR / analysis lifecycle, stored as lowercase text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for ProcessingStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status: {}", other)),
        }
    }
}

/// One stored file attached to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFile {
    pub url: String,
    pub name: String,
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl DocumentFile {
    /// Whether the file can be fed to OCR
    pub fn is_ocr_candidate(&self) -> bool {
        matches!(
            self.mime_type.as_deref(),
            Some("image/jpeg" | "image/png" | "image/gif" | "application/pdf")
        )
    }
}

/// Document row with the owning member's name and relationship
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HealthDocument {
    pub id: Uuid,
    pub member_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub doc_type: DocumentType,
    pub name: String,
    pub check_date: NaiveDate,
    pub institution: Option<String>,
    pub files: Json<Vec<DocumentFile>>,
    pub notes: Option<String>,
    pub ocr_text: Option<String>,
    #[sqlx(try_from = "String")]
    pub ocr_status: ProcessingStatus,
    pub ocr_progress: i32,
    pub ocr_error: Option<String>,
    #[sqlx(try_from = "String")]
    pub analyze_status: ProcessingStatus,
    pub analyze_error: Option<String>,
    pub parsed_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_name: String,
    pub member_relationship: Relationship,
    pub family_id: Uuid,
}

impl HealthDocument {
    pub fn files(&self) -> &[DocumentFile] {
        &self.files.0
    }

    /// First attached file that OCR can read
    pub fn ocr_source(&self) -> Option<&DocumentFile> {
        self.files().iter().find(|f| f.is_ocr_candidate())
    }

    /// Text of an analyzed document, if any
    pub fn parsed_content(&self) -> Option<&str> {
        self.parsed_data
            .as_ref()
            .and_then(|v| v.get("content"))
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub member_id: Uuid,
    pub doc_type: DocumentType,
    pub name: String,
    pub check_date: NaiveDate,
    pub institution: Option<String>,
    pub files: Vec<DocumentFile>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDocument {
    pub member_id: Option<Uuid>,
    pub doc_type: Option<DocumentType>,
    pub name: Option<String>,
    pub check_date: Option<NaiveDate>,
    pub institution: Option<String>,
    pub files: Option<Vec<DocumentFile>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub member_id: Option<Uuid>,
    pub doc_type: Option<DocumentType>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

const DOCUMENT_SELECT: &str = r#"
    SELECT d.id, d.member_id, d.type, d.name, d.check_date, d.institution, d.files, d.notes,
           d.ocr_text, d.ocr_status, d.ocr_progress, d.ocr_error,
           d.analyze_status, d.analyze_error, d.parsed_data, d.created_at, d.updated_at,
           m.name AS member_name, m.relationship AS member_relationship, m.family_id
    FROM health_documents d
    JOIN family_members m ON m.id = d.member_id
"#;

impl HealthDocument {
    pub async fn create(pool: &PgPool, data: CreateDocument) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO health_documents (member_id, type, name, check_date, institution, files, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(data.member_id)
        .bind(data.doc_type)
        .bind(data.name)
        .bind(data.check_date)
        .bind(data.institution)
        .bind(Json(data.files))
        .bind(data.notes)
        .fetch_one(pool)
        .await
    }

    /// Live document by id, regardless of family
    pub async fn find_live(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("{DOCUMENT_SELECT} WHERE d.id = $1 AND d.deleted_at IS NULL AND m.deleted_at IS NULL");

        sqlx::query_as::<_, HealthDocument>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Family-scoped listing ordered by check date, newest first
    pub async fn list(pool: &PgPool, family_id: Uuid, filter: &DocumentFilter) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{DOCUMENT_SELECT}
            WHERE m.family_id = $1 AND d.deleted_at IS NULL AND m.deleted_at IS NULL
              AND ($2::uuid IS NULL OR d.member_id = $2)
              AND ($3::document_type IS NULL OR d.type = $3)
              AND ($4::date IS NULL OR d.check_date >= $4)
              AND ($5::date IS NULL OR d.check_date <= $5)
            ORDER BY d.check_date DESC, d.created_at DESC
            "#
        );

        sqlx::query_as::<_, HealthDocument>(&sql)
            .bind(family_id)
            .bind(filter.member_id)
            .bind(filter.doc_type)
            .bind(filter.start)
            .bind(filter.end)
            .fetch_all(pool)
            .await
    }

    /// Latest documents of one member
    pub async fn recent_for_member(pool: &PgPool, member_id: Uuid, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{DOCUMENT_SELECT}
            WHERE d.member_id = $1 AND d.deleted_at IS NULL
            ORDER BY d.check_date DESC, d.created_at DESC
            LIMIT $2
            "#
        );

        sqlx::query_as::<_, HealthDocument>(&sql)
            .bind(member_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Analyzed documents of a member updated after `after` (all when `None`)
    pub async fn count_analyzed_since(
        pool: &PgPool,
        member_id: Uuid,
        after: Option<DateTime<Utc>>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM health_documents
             WHERE member_id = $1 AND deleted_at IS NULL AND parsed_data IS NOT NULL
               AND ($2::timestamptz IS NULL OR updated_at > $2)",
        )
        .bind(member_id)
        .bind(after)
        .fetch_one(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateDocument) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE health_documents SET
                member_id = COALESCE($2, member_id),
                type = COALESCE($3, type),
                name = COALESCE($4, name),
                check_date = COALESCE($5, check_date),
                institution = COALESCE($6, institution),
                files = COALESCE($7, files),
                notes = COALESCE($8, notes),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(data.member_id)
        .bind(data.doc_type)
        .bind(data.name)
        .bind(data.check_date)
        .bind(data.institution)
        .bind(data.files.map(Json))
        .bind(data.notes)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE health_documents SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_ocr_progress(
        pool: &PgPool,
        id: Uuid,
        status: ProcessingStatus,
        progress: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE health_documents
             SET ocr_status = $2, ocr_progress = $3, ocr_error = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(progress)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn finish_ocr(pool: &PgPool, id: Uuid, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE health_documents
             SET ocr_status = 'completed', ocr_progress = 100, ocr_text = $2, ocr_error = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(text)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn fail_ocr(pool: &PgPool, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE health_documents SET ocr_status = 'failed', ocr_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Manual correction of OCR output
    pub async fn set_ocr_text(pool: &PgPool, id: Uuid, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE health_documents SET ocr_text = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Moves analysis to `processing` unless it already is; returns whether it moved
    pub async fn begin_analysis<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE health_documents
             SET analyze_status = 'processing', analyze_error = NULL, updated_at = NOW()
             WHERE id = $1 AND analyze_status <> 'processing'",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn finish_analysis(pool: &PgPool, id: Uuid, parsed: serde_json::Value) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE health_documents
             SET analyze_status = 'completed', parsed_data = $2, analyze_error = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(parsed)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn fail_analysis(pool: &PgPool, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE health_documents SET analyze_status = 'failed', analyze_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(())
    }
}
