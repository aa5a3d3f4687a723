/// Medical documents, OCR and AI formatting
///
/// A document groups uploaded files (reports, prescriptions, scans) for one
/// member. Text is pulled out of the first image with the vision model, and
/// can then be tidied into markdown, which advice and chat quote back.
///
/// # Endpoints
///
/// - `GET /api/v1/documents` - Filtered listing, newest check date first
/// - `POST /api/v1/documents` - Create
/// - `GET /api/v1/documents/:id` - Detail
/// - `PATCH /api/v1/documents/:id` - Partial update
/// - `DELETE /api/v1/documents/:id` - Soft delete and remove stored files
/// - `GET /api/v1/documents/:id/ocr` - Run OCR, progress over SSE
/// - `PATCH /api/v1/documents/:id/ocr` - Replace the OCR text
/// - `POST /api/v1/documents/:id/analyze` - Start markdown formatting
/// - `GET /api/v1/documents/:id/analyze` - Formatting status
///
/// # OCR stream
///
/// Every event is an unnamed `data:` line:
///
/// ```text
/// data: {"type":"progress","status":"processing","progress":0,"message":"开始 OCR 识别..."}
/// data: {"type":"complete","status":"completed","progress":100,"ocrText":"…","tokensUsed":812}
/// ```
///
/// A failure ends the stream with `{"type":"error","error":"…"}`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{FamilyScope, RequestMeta},
    routes::{json_event, members::require_member, sse_response, SSE_CHANNEL_CAPACITY},
    services::{
        ai::{AiClient, AiSettings},
        audit,
        storage::FileStorage,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    Json,
};
use chrono::NaiveDate;
use famhealth_shared::models::{
    audit_log::{AuditAction, AuditEntry, AuditResource},
    document::{CreateDocument, DocumentFile, DocumentFilter, DocumentType, HealthDocument, ProcessingStatus, UpdateDocument},
    member::Relationship,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::convert::Infallible;
use tokio::sync::mpsc;
use uuid::Uuid;
use validator::Validate;

const OCR_START_MESSAGE: &str = "开始 OCR 识别...";
const OCR_RECOGNIZING_MESSAGE: &str = "正在识别文字...";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMember {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: HealthDocument,
    pub member: DocumentMember,
}

impl DocumentResponse {
    fn listing(document: HealthDocument) -> Self {
        let member = DocumentMember {
            id: document.member_id,
            name: document.member_name.clone(),
            relationship: None,
        };
        Self { document, member }
    }

    fn detail(document: HealthDocument) -> Self {
        let member = DocumentMember {
            id: document.member_id,
            name: document.member_name.clone(),
            relationship: Some(document.member_relationship),
        };
        Self { document, member }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsQuery {
    pub member_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub doc_type: Option<DocumentType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub member_id: Uuid,

    #[serde(rename = "type")]
    pub doc_type: DocumentType,

    #[validate(length(min = 1, max = 200, message = "Name must be 1 to 200 characters"))]
    pub name: String,

    pub check_date: NaiveDate,

    #[validate(length(max = 200, message = "Institution must be at most 200 characters"))]
    pub institution: Option<String>,

    #[serde(default)]
    pub files: Vec<DocumentFile>,

    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentRequest {
    pub member_id: Option<Uuid>,

    #[serde(rename = "type")]
    pub doc_type: Option<DocumentType>,

    #[validate(length(min = 1, max = 200, message = "Name must be 1 to 200 characters"))]
    pub name: Option<String>,

    pub check_date: Option<NaiveDate>,

    #[validate(length(max = 200, message = "Institution must be at most 200 characters"))]
    pub institution: Option<String>,

    pub files: Option<Vec<DocumentFile>>,

    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOcrTextRequest {
    pub ocr_text: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OcrEvent<'a> {
    Progress {
        status: ProcessingStatus,
        progress: i32,
        message: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        status: ProcessingStatus,
        progress: i32,
        ocr_text: &'a str,
        tokens_used: i32,
    },
    Error {
        error: &'a str,
    },
}

impl OcrEvent<'_> {
    fn into_event(self) -> Event {
        json_event(None, &self)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeStarted {
    pub status: ProcessingStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeStatus {
    pub status: ProcessingStatus,
    pub error: Option<String>,
    pub parsed_data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Loads a live document and checks it belongs to `family_id`
async fn require_document(pool: &PgPool, family_id: Uuid, id: Uuid) -> ApiResult<HealthDocument> {
    let document = HealthDocument::find_live(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    if document.family_id != family_id {
        return Err(ApiError::Forbidden("No access to this document".to_string()));
    }

    Ok(document)
}

pub async fn list_documents(
    State(state): State<AppState>,
    scope: FamilyScope,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult<Json<Vec<DocumentResponse>>> {
    let filter = DocumentFilter {
        member_id: query.member_id,
        doc_type: query.doc_type,
        start: query.start_date,
        end: query.end_date,
    };

    let documents = HealthDocument::list(&state.db, scope.family_id, &filter).await?;
    Ok(Json(documents.into_iter().map(DocumentResponse::listing).collect()))
}

pub async fn get_document(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DocumentResponse>> {
    let document = require_document(&state.db, scope.family_id, id).await?;
    Ok(Json(DocumentResponse::detail(document)))
}

pub async fn create_document(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Json(req): Json<CreateDocumentRequest>,
) -> ApiResult<(StatusCode, Json<DocumentResponse>)> {
    req.validate()?;
    require_member(&state.db, scope.family_id, req.member_id).await?;

    let id = HealthDocument::create(
        &state.db,
        CreateDocument {
            member_id: req.member_id,
            doc_type: req.doc_type,
            name: req.name.trim().to_string(),
            check_date: req.check_date,
            institution: req.institution,
            files: req.files,
            notes: req.notes,
        },
    )
    .await?;

    let document = require_document(&state.db, scope.family_id, id).await?;

    tracing::info!(document_id = %id, member_id = %document.member_id, "document created");

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(scope.user_id()), AuditAction::Create, AuditResource::Document)
            .resource_id(id)
            .details(json!({ "name": document.name, "type": document.doc_type })),
    );

    Ok((StatusCode::CREATED, Json(DocumentResponse::detail(document))))
}

/// Partial update
///
/// Moving the document to another member requires that member to be in the
/// caller's family too.
pub async fn update_document(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDocumentRequest>,
) -> ApiResult<Json<DocumentResponse>> {
    req.validate()?;
    require_document(&state.db, scope.family_id, id).await?;

    if let Some(member_id) = req.member_id {
        require_member(&state.db, scope.family_id, member_id).await?;
    }

    HealthDocument::update(
        &state.db,
        id,
        UpdateDocument {
            member_id: req.member_id,
            doc_type: req.doc_type,
            name: req.name.map(|n| n.trim().to_string()),
            check_date: req.check_date,
            institution: req.institution,
            files: req.files,
            notes: req.notes,
        },
    )
    .await?;

    let document = require_document(&state.db, scope.family_id, id).await?;
    Ok(Json(DocumentResponse::detail(document)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let document = require_document(&state.db, scope.family_id, id).await?;
    HealthDocument::soft_delete(&state.db, id).await?;

    for file in document.files() {
        if let Err(e) = state.storage.delete(&file.url).await {
            tracing::warn!(document_id = %id, url = %file.url, error = %e, "failed to remove stored file");
        }
    }

    tracing::info!(document_id = %id, "document deleted");

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(scope.user_id()), AuditAction::Delete, AuditResource::Document)
            .resource_id(id)
            .details(json!({ "name": document.name })),
    );

    Ok(Json(MessageResponse {
        message: "Document deleted".to_string(),
    }))
}

/// Run OCR on the document's first image
///
/// The document is marked `processing` before the stream opens, so a client
/// polling the detail endpoint sees the run even if it drops the stream.
///
/// # Errors
///
/// - `400 Bad Request`: No image or PDF attached, or AI not configured
pub async fn ocr_stream(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let document = require_document(&state.db, scope.family_id, id).await?;

    let source = document
        .ocr_source()
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("No image or PDF file to recognise".to_string()))?;

    let settings = state.ai.settings(&state.db).await?;

    HealthDocument::set_ocr_progress(&state.db, id, ProcessingStatus::Processing, 0).await?;

    let (tx, rx) = mpsc::channel(SSE_CHANNEL_CAPACITY);
    let _ = tx
        .send(
            OcrEvent::Progress {
                status: ProcessingStatus::Processing,
                progress: 0,
                message: OCR_START_MESSAGE,
            }
            .into_event(),
        )
        .await;

    tokio::spawn(run_ocr(
        state.db.clone(),
        state.ai.clone(),
        state.storage.clone(),
        settings,
        id,
        source,
        tx,
    ));

    Ok(sse_response(rx))
}

/// Background half of [`ocr_stream`]; the outcome is persisted even when the
/// client has gone away
async fn run_ocr(
    db: PgPool,
    ai: AiClient,
    storage: FileStorage,
    settings: AiSettings,
    document_id: Uuid,
    source: DocumentFile,
    tx: mpsc::Sender<Event>,
) {
    let mime_type = source.mime_type.clone().unwrap_or_default();

    let result = match storage.resolve(&source.url) {
        Ok(path) => {
            if let Err(e) = HealthDocument::set_ocr_progress(&db, document_id, ProcessingStatus::Processing, 30).await {
                tracing::warn!(%document_id, error = %e, "failed to store OCR progress");
            }
            let _ = tx
                .send(
                    OcrEvent::Progress {
                        status: ProcessingStatus::Processing,
                        progress: 30,
                        message: OCR_RECOGNIZING_MESSAGE,
                    }
                    .into_event(),
                )
                .await;

            ai.ocr_image(&settings, &path, &mime_type).await.map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    };

    match result {
        Ok(completion) => {
            if let Err(e) = HealthDocument::finish_ocr(&db, document_id, &completion.content).await {
                tracing::error!(%document_id, error = %e, "failed to store OCR text");
                let _ = tx
                    .send(OcrEvent::Error { error: "Failed to save OCR result" }.into_event())
                    .await;
                return;
            }

            tracing::info!(%document_id, tokens = completion.tokens_used, "OCR completed");

            let _ = tx
                .send(
                    OcrEvent::Complete {
                        status: ProcessingStatus::Completed,
                        progress: 100,
                        ocr_text: &completion.content,
                        tokens_used: completion.tokens_used,
                    }
                    .into_event(),
                )
                .await;
        }
        Err(error) => {
            tracing::warn!(%document_id, %error, "OCR failed");
            if let Err(e) = HealthDocument::fail_ocr(&db, document_id, &error).await {
                tracing::error!(%document_id, error = %e, "failed to store OCR failure");
            }
            let _ = tx.send(OcrEvent::Error { error: &error }.into_event()).await;
        }
    }
}

pub async fn update_ocr_text(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOcrTextRequest>,
) -> ApiResult<Json<DocumentResponse>> {
    require_document(&state.db, scope.family_id, id).await?;
    HealthDocument::set_ocr_text(&state.db, id, &req.ocr_text).await?;

    let document = require_document(&state.db, scope.family_id, id).await?;
    Ok(Json(DocumentResponse::detail(document)))
}

/// Start formatting the OCR text as markdown
///
/// Returns immediately; poll [`analyze_status`] for the result.
///
/// # Errors
///
/// - `400 Bad Request`: No OCR text yet, or AI not configured
/// - `409 Conflict`: A run is already in progress
pub async fn start_analysis(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AnalyzeStarted>> {
    let document = require_document(&state.db, scope.family_id, id).await?;

    let ocr_text = document
        .ocr_text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Run OCR before analysis".to_string()))?;

    let settings = state.ai.settings(&state.db).await?;

    if !HealthDocument::begin_analysis(&state.db, id).await? {
        return Err(ApiError::Conflict("Analysis is already in progress".to_string()));
    }

    let db = state.db.clone();
    let ai = state.ai.clone();
    tokio::spawn(async move {
        match ai.format_ocr_text(&settings, &ocr_text).await {
            Ok(completion) => {
                let parsed = json!({ "type": "markdown", "content": completion.content });
                match HealthDocument::finish_analysis(&db, id, parsed).await {
                    Ok(()) => tracing::info!(document_id = %id, tokens = completion.tokens_used, "analysis completed"),
                    Err(e) => tracing::error!(document_id = %id, error = %e, "failed to store analysis"),
                }
            }
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "analysis failed");
                if let Err(e) = HealthDocument::fail_analysis(&db, id, &e.to_string()).await {
                    tracing::error!(document_id = %id, error = %e, "failed to store analysis failure");
                }
            }
        }
    });

    Ok(Json(AnalyzeStarted {
        status: ProcessingStatus::Processing,
    }))
}

pub async fn analyze_status(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AnalyzeStatus>> {
    let document = require_document(&state.db, scope.family_id, id).await?;

    Ok(Json(AnalyzeStatus {
        status: document.analyze_status,
        error: document.analyze_error,
        parsed_data: document.parsed_data,
    }))
}
