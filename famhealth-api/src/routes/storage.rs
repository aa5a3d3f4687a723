/// File uploads
///
/// # Endpoints
///
/// - `POST /api/v1/storage/upload` - multipart field `file`
/// - `POST /api/v1/storage/upload-multiple` - multipart field `files`, up to 10
///
/// Accepted types are JPEG, PNG, GIF and PDF. The returned `url` is served
/// from `/uploads` and goes into a document's `files` list.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::CurrentUser,
    services::storage::MAX_FILES_PER_UPLOAD,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use famhealth_shared::models::document::DocumentFile;

/// One file pulled out of the request body
struct UploadPart {
    original_name: String,
    mime_type: String,
    data: Bytes,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the size limit".to_string())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// Collects every part named `field_name`
async fn read_parts(multipart: &mut Multipart, field_name: &str, max: usize) -> ApiResult<Vec<UploadPart>> {
    let mut parts = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            continue;
        }
        if parts.len() == max {
            return Err(ApiError::BadRequest(format!("At most {} files per upload", max)));
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(multipart_error)?;

        parts.push(UploadPart {
            original_name,
            mime_type,
            data,
        });
    }

    Ok(parts)
}

pub async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<DocumentFile>)> {
    let part = read_parts(&mut multipart, "file", 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    let file = state
        .storage
        .save(user.id, &part.original_name, &part.mime_type, &part.data)
        .await?;

    Ok((StatusCode::CREATED, Json(file)))
}

/// Upload several files
///
/// Every file is validated before the first one is written.
pub async fn upload_multiple(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<DocumentFile>>)> {
    let parts = read_parts(&mut multipart, "files", MAX_FILES_PER_UPLOAD).await?;
    if parts.is_empty() {
        return Err(ApiError::BadRequest("No files provided".to_string()));
    }

    for part in &parts {
        state.storage.validate(&part.mime_type, part.data.len())?;
    }

    let mut files = Vec::with_capacity(parts.len());
    for part in parts {
        files.push(
            state
                .storage
                .save(user.id, &part.original_name, &part.mime_type, &part.data)
                .await?,
        );
    }

    tracing::info!(user_id = %user.id, count = files.len(), "files uploaded");

    Ok((StatusCode::CREATED, Json(files)))
}
