/// Registration whitelist
///
/// Admins (emails listed in `ADMIN_EMAILS`) manage which emails may register
/// and log in. An empty whitelist admits the first email that shows up and
/// records it, so a fresh deployment can bootstrap itself.
///
/// # Endpoints
///
/// - `GET /api/v1/whitelist` - List entries (admin)
/// - `POST /api/v1/whitelist` - Add an email (admin)
/// - `DELETE /api/v1/whitelist/:email` - Remove an email (admin)
/// - `GET /api/v1/whitelist/check-admin` - Whether the caller is an admin

use crate::{
    app::AppState,
    config::Config,
    error::{ApiError, ApiResult},
    extract::CurrentUser,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use famhealth_shared::models::allowed_email::{normalize_email, AllowedEmail};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

/// `addedBy` for entries created without an admin
pub const SYSTEM_ADDED_BY: &str = "system";

/// Admits `email` or rejects with 403
///
/// Takes a single connection so the emptiness check and the bootstrap insert
/// can run inside the caller's transaction.
pub async fn ensure_allowed(conn: &mut PgConnection, email: &str) -> ApiResult<()> {
    if AllowedEmail::count(&mut *conn).await? == 0 {
        AllowedEmail::add_if_missing(&mut *conn, email, SYSTEM_ADDED_BY).await?;
        tracing::info!(%email, "whitelist empty, admitted first account");
        return Ok(());
    }

    if !AllowedEmail::contains(&mut *conn, email).await? {
        tracing::warn!(%email, "email not on whitelist");
        return Err(ApiError::Forbidden("account not authorized".to_string()));
    }

    Ok(())
}

/// Seeds an empty whitelist from `INITIAL_WHITELIST_EMAILS` and `ADMIN_EMAILS`
///
/// Returns how many entries were added.
pub async fn seed(pool: &PgPool, config: &Config) -> Result<usize, sqlx::Error> {
    if AllowedEmail::count(pool).await? > 0 {
        return Ok(0);
    }

    let mut added = 0;
    for email in config
        .access
        .initial_whitelist
        .iter()
        .chain(config.access.admin_emails.iter())
    {
        if AllowedEmail::add_if_missing(pool, email, SYSTEM_ADDED_BY).await? {
            added += 1;
        }
    }

    if added > 0 {
        tracing::info!(added, "seeded whitelist");
    }
    Ok(added)
}

fn require_admin(state: &AppState, user: &famhealth_shared::models::user::User) -> ApiResult<()> {
    if state.is_admin(&user.email) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin access required".to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistResponse {
    pub emails: Vec<AllowedEmail>,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCheckResponse {
    pub is_admin: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddEmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<WhitelistResponse>> {
    require_admin(&state, &user)?;

    Ok(Json(WhitelistResponse {
        emails: AllowedEmail::list(&state.db).await?,
        is_admin: true,
    }))
}

/// Add an email
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin
/// - `409 Conflict`: Email already listed
pub async fn add(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<AddEmailRequest>,
) -> ApiResult<(StatusCode, Json<AllowedEmail>)> {
    require_admin(&state, &user)?;
    let req = AddEmailRequest {
        email: normalize_email(&req.email),
    };
    req.validate()?;

    if AllowedEmail::contains(&state.db, &req.email).await? {
        return Err(ApiError::Conflict("Email is already on the whitelist".to_string()));
    }

    let entry = AllowedEmail::add(&state.db, &req.email, &user.email).await?;
    tracing::info!(email = %entry.email, added_by = %user.email, "whitelist entry added");

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Remove an email
///
/// # Errors
///
/// - `404 Not Found`: Email not listed
/// - `409 Conflict`: Email belongs to an admin
pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(email): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    require_admin(&state, &user)?;
    let email = normalize_email(&email);

    if state.is_admin(&email) {
        return Err(ApiError::Conflict("Admin emails cannot be removed".to_string()));
    }

    if !AllowedEmail::remove(&state.db, &email).await? {
        return Err(ApiError::NotFound("Email is not on the whitelist".to_string()));
    }

    tracing::info!(%email, removed_by = %user.email, "whitelist entry removed");

    Ok(Json(MessageResponse {
        message: "Removed from whitelist".to_string(),
    }))
}

pub async fn check_admin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<AdminCheckResponse> {
    Json(AdminCheckResponse {
        is_admin: state.is_admin(&user.email),
    })
}
