/// Family (household) management
///
/// A user belongs to at most one family. The creator owns it; others join
/// with the 8-character invite code. Everything health related is scoped to
/// the family, so a user without one can only reach these endpoints.
///
/// # Endpoints
///
/// - `GET /api/v1/family` - Caller's family with its users, or `null`
/// - `POST /api/v1/family` - Create and become owner
/// - `PATCH /api/v1/family` - Rename (owner)
/// - `POST /api/v1/family/join` - Join by invite code
/// - `POST /api/v1/family/regenerate-code` - New invite code (owner)
/// - `DELETE /api/v1/family/leave` - Leave; the last user out deletes the family
/// - `DELETE /api/v1/family/members/:userId` - Remove another user (owner)
/// - `GET /api/v1/family/admin/overview` - All families with counters (admin)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::CurrentUser,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use famhealth_shared::{
    domain::invite::{generate_invite_code, MAX_INVITE_ATTEMPTS},
    models::{
        family::{Family, FamilyOverview},
        member::FamilyMember,
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

const UNKNOWN_CREATOR: &str = "未知";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFamilyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFamilyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinFamilyRequest {
    #[validate(length(equal = 8, message = "Invite code must be 8 characters"))]
    pub invite_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_owner: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyResponse {
    #[serde(flatten)]
    pub family: Family,
    pub users: Vec<FamilyUser>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewEntry {
    pub family_id: Uuid,
    pub family_name: String,
    pub creator_email: String,
    pub creator_name: String,
    pub member_count: i64,
    pub document_count: i64,
    pub record_count: i64,
    pub advice_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<FamilyOverview> for OverviewEntry {
    fn from(o: FamilyOverview) -> Self {
        Self {
            family_id: o.family_id,
            family_name: o.family_name,
            creator_email: o.creator_email.unwrap_or_else(|| UNKNOWN_CREATOR.to_string()),
            creator_name: o.creator_name.unwrap_or_else(|| UNKNOWN_CREATOR.to_string()),
            member_count: o.member_count,
            document_count: o.document_count,
            record_count: o.record_count,
            advice_count: o.advice_count,
            created_at: o.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Draws invite codes until one is unused
async fn unique_invite_code(pool: &PgPool) -> ApiResult<String> {
    for _ in 0..MAX_INVITE_ATTEMPTS {
        let code = generate_invite_code();
        if !Family::invite_code_exists(pool, &code).await? {
            return Ok(code);
        }
    }

    tracing::error!(attempts = MAX_INVITE_ATTEMPTS, "invite code space exhausted");
    Err(ApiError::BadRequest("Failed to generate a unique invite code".to_string()))
}

async fn family_response(pool: &PgPool, family: Family) -> ApiResult<FamilyResponse> {
    let users = User::list_by_family(pool, family.id)
        .await?
        .into_iter()
        .map(|u| FamilyUser {
            id: u.id,
            name: u.name,
            email: u.email,
            is_owner: u.is_owner,
            joined_at: u.created_at,
        })
        .collect();

    Ok(FamilyResponse { family, users })
}

/// Loads the caller's family, requiring ownership
async fn owned_family(pool: &PgPool, user: &User) -> ApiResult<Family> {
    let family_id = user.family_id.ok_or_else(ApiError::no_family)?;
    if !user.is_owner {
        return Err(ApiError::Forbidden("Only the family owner can do this".to_string()));
    }

    Family::find_by_id(pool, family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Family not found".to_string()))
}

pub async fn get_family(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Option<FamilyResponse>>> {
    let Some(family_id) = user.family_id else {
        return Ok(Json(None));
    };

    match Family::find_by_id(&state.db, family_id).await? {
        Some(family) => Ok(Json(Some(family_response(&state.db, family).await?))),
        None => Ok(Json(None)),
    }
}

/// Create a family and become its owner
///
/// # Errors
///
/// - `409 Conflict`: Caller already belongs to a family
pub async fn create_family(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateFamilyRequest>,
) -> ApiResult<(StatusCode, Json<FamilyResponse>)> {
    req.validate()?;

    if user.family_id.is_some() {
        return Err(ApiError::Conflict("You already belong to a family".to_string()));
    }

    let code = unique_invite_code(&state.db).await?;

    let mut tx = state.db.begin().await?;
    let family = Family::create(&mut *tx, req.name.trim(), &code).await?;
    User::set_family(&mut *tx, user.id, Some(family.id), true).await?;
    tx.commit().await?;

    tracing::info!(family_id = %family.id, owner = %user.id, "family created");

    Ok((StatusCode::CREATED, Json(family_response(&state.db, family).await?)))
}

/// Join a family by invite code
///
/// # Errors
///
/// - `404 Not Found`: No family uses the code
/// - `409 Conflict`: Caller already belongs to a family
pub async fn join_family(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<JoinFamilyRequest>,
) -> ApiResult<Json<FamilyResponse>> {
    req.validate()?;

    if user.family_id.is_some() {
        return Err(ApiError::Conflict("You already belong to a family".to_string()));
    }

    let code = req.invite_code.trim().to_uppercase();

    let family = Family::find_by_invite_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::NotFound("Invalid invite code".to_string()))?;

    User::set_family(&state.db, user.id, Some(family.id), false).await?;

    tracing::info!(family_id = %family.id, user_id = %user.id, "user joined family");

    Ok(Json(family_response(&state.db, family).await?))
}

pub async fn update_family(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateFamilyRequest>,
) -> ApiResult<Json<FamilyResponse>> {
    req.validate()?;
    let family = owned_family(&state.db, &user).await?;

    let family = match req.name {
        Some(name) => Family::update_name(&state.db, family.id, name.trim()).await?,
        None => family,
    };

    Ok(Json(family_response(&state.db, family).await?))
}

pub async fn regenerate_code(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<FamilyResponse>> {
    let family = owned_family(&state.db, &user).await?;

    let code = unique_invite_code(&state.db).await?;
    let family = Family::update_invite_code(&state.db, family.id, &code).await?;

    tracing::info!(family_id = %family.id, "invite code regenerated");

    Ok(Json(family_response(&state.db, family).await?))
}

/// Leave the family
///
/// Members linked to the caller are unlinked. When nobody is left the
/// family, its members and their documents are soft-deleted; health data
/// stays in place.
///
/// # Errors
///
/// - `403 Forbidden`: Owner tries to leave while others remain
pub async fn leave_family(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<MessageResponse>> {
    let family_id = user.family_id.ok_or_else(ApiError::no_family)?;

    let mut tx = state.db.begin().await?;

    let others = User::list_by_family(&mut *tx, family_id)
        .await?
        .into_iter()
        .filter(|u| u.id != user.id)
        .count();

    if user.is_owner && others > 0 {
        return Err(ApiError::Forbidden(
            "The owner cannot leave while other users remain in the family".to_string(),
        ));
    }

    FamilyMember::unlink_user(&mut *tx, user.id).await?;
    User::set_family(&mut *tx, user.id, None, false).await?;

    if others == 0 {
        let removed = FamilyMember::soft_delete_family(&mut *tx, family_id).await?;
        Family::soft_delete(&mut *tx, family_id).await?;
        tracing::info!(%family_id, documents_removed = removed, "last user left, family closed");
    }

    tx.commit().await?;

    tracing::info!(%family_id, user_id = %user.id, "user left family");

    Ok(MessageResponse::new("Left the family"))
}

/// Remove another user from the family
///
/// # Errors
///
/// - `400 Bad Request`: Owner targets themselves
/// - `403 Forbidden`: Caller is not the owner
/// - `404 Not Found`: Target is not in this family
pub async fn remove_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(target_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let family = owned_family(&state.db, &user).await?;

    if target_id == user.id {
        return Err(ApiError::BadRequest("You cannot remove yourself".to_string()));
    }

    let target = User::find_by_id(&state.db, target_id)
        .await?
        .filter(|t| t.family_id == Some(family.id))
        .ok_or_else(|| ApiError::NotFound("User is not in this family".to_string()))?;

    let mut tx = state.db.begin().await?;
    FamilyMember::unlink_user(&mut *tx, target.id).await?;
    User::set_family(&mut *tx, target.id, None, false).await?;
    tx.commit().await?;

    tracing::info!(family_id = %family.id, removed = %target.id, "user removed from family");

    Ok(MessageResponse::new("User removed from the family"))
}

pub async fn admin_overview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<OverviewEntry>>> {
    if !state.is_admin(&user.email) {
        return Err(ApiError::Forbidden("admin access required".to_string()));
    }

    let overview = Family::admin_overview(&state.db).await?;
    Ok(Json(overview.into_iter().map(OverviewEntry::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_defaults_unknown_creator() {
        let entry = OverviewEntry::from(FamilyOverview {
            family_id: Uuid::nil(),
            family_name: "Home".to_string(),
            creator_email: None,
            creator_name: None,
            member_count: 2,
            document_count: 0,
            record_count: 5,
            advice_count: 1,
            created_at: Utc::now(),
        });

        assert_eq!(entry.creator_email, UNKNOWN_CREATOR);
        assert_eq!(entry.creator_name, UNKNOWN_CREATOR);
        assert_eq!(entry.record_count, 5);
    }

    #[test]
    fn test_join_request_requires_eight_chars() {
        let ok = JoinFamilyRequest {
            invite_code: "ABCD2345".to_string(),
        };
        assert!(ok.validate().is_ok());

        let short = JoinFamilyRequest {
            invite_code: "ABC".to_string(),
        };
        assert!(short.validate().is_err());
    }
}
