/// Family members
///
/// Members are the people whose health is tracked. A member may be linked to
/// one user account (the person managing their own data); each family has at
/// most one `SELF` member.
///
/// # Endpoints
///
/// - `GET /api/v1/members` - Live members with counters
/// - `POST /api/v1/members` - Create
/// - `GET /api/v1/members/me` - Member linked to the caller, or `null`
/// - `DELETE /api/v1/members/me/link` - Unlink the caller
/// - `GET /api/v1/members/stats` - Family-wide counters
/// - `GET /api/v1/members/:id` - Detail with counters
/// - `PATCH /api/v1/members/:id` - Partial update
/// - `DELETE /api/v1/members/:id` - Soft delete
/// - `POST /api/v1/members/:id/link` - Link the caller

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{FamilyScope, RequestMeta},
    services::audit,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use famhealth_shared::models::{
    audit_log::{AuditAction, AuditEntry, AuditResource},
    member::{
        BloodType, CreateMember, FamilyMember, FamilyStats, Gender, MemberWithCounts, Relationship, UpdateMember,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Loads a live member and checks it belongs to `family_id`
///
/// # Errors
///
/// - `404 Not Found`: Missing or soft-deleted
/// - `403 Forbidden`: Member of another family
pub async fn require_member(pool: &PgPool, family_id: Uuid, member_id: Uuid) -> ApiResult<FamilyMember> {
    let member = FamilyMember::find_live(pool, member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    if member.family_id != family_id {
        return Err(ApiError::Forbidden("No access to this member".to_string()));
    }

    Ok(member)
}

const SELF_EXISTS: &str = "This family already has a SELF member";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    pub relationship: Relationship,

    pub gender: Gender,

    pub birth_date: NaiveDate,

    #[validate(length(max = 500))]
    pub avatar: Option<String>,

    pub blood_type: Option<BloodType>,

    #[validate(range(min = 0.0, max = 300.0, message = "Height must be between 0 and 300 cm"))]
    pub height: Option<f64>,

    #[validate(range(min = 0.0, max = 500.0, message = "Weight must be between 0 and 500 kg"))]
    pub weight: Option<f64>,

    #[serde(default)]
    pub chronic_diseases: Vec<String>,

    pub allergies: Option<String>,

    pub notes: Option<String>,

    /// Link the new member to the caller's account
    #[serde(default)]
    pub link_to_current_user: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,

    pub relationship: Option<Relationship>,

    pub gender: Option<Gender>,

    pub birth_date: Option<NaiveDate>,

    #[validate(length(max = 500))]
    pub avatar: Option<String>,

    pub blood_type: Option<BloodType>,

    #[validate(range(min = 0.0, max = 300.0, message = "Height must be between 0 and 300 cm"))]
    pub height: Option<f64>,

    #[validate(range(min = 0.0, max = 500.0, message = "Weight must be between 0 and 500 kg"))]
    pub weight: Option<f64>,

    pub chronic_diseases: Option<Vec<String>>,

    pub allergies: Option<String>,

    pub notes: Option<String>,
}

impl From<UpdateMemberRequest> for UpdateMember {
    fn from(req: UpdateMemberRequest) -> Self {
        Self {
            name: req.name.map(|n| n.trim().to_string()),
            relationship: req.relationship,
            gender: req.gender,
            birth_date: req.birth_date,
            avatar: req.avatar,
            blood_type: req.blood_type,
            height: req.height,
            weight: req.weight,
            chronic_diseases: req.chronic_diseases,
            allergies: req.allergies,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list_members(
    State(state): State<AppState>,
    scope: FamilyScope,
) -> ApiResult<Json<Vec<MemberWithCounts>>> {
    Ok(Json(FamilyMember::list_with_counts(&state.db, scope.family_id).await?))
}

pub async fn my_member(
    State(state): State<AppState>,
    scope: FamilyScope,
) -> ApiResult<Json<Option<FamilyMember>>> {
    let member = FamilyMember::find_by_user(&state.db, scope.user_id())
        .await?
        .filter(|m| m.family_id == scope.family_id);

    Ok(Json(member))
}

pub async fn family_stats(State(state): State<AppState>, scope: FamilyScope) -> ApiResult<Json<FamilyStats>> {
    Ok(Json(FamilyMember::family_stats(&state.db, scope.family_id).await?))
}

pub async fn get_member(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MemberWithCounts>> {
    let member = FamilyMember::find_with_counts(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    if member.member.family_id != scope.family_id {
        return Err(ApiError::Forbidden("No access to this member".to_string()));
    }

    Ok(Json(member))
}

/// Create a member
///
/// # Errors
///
/// - `409 Conflict`: Second SELF member, or the caller is already linked
///   while `linkToCurrentUser` is set
pub async fn create_member(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Json(req): Json<CreateMemberRequest>,
) -> ApiResult<(StatusCode, Json<FamilyMember>)> {
    req.validate()?;

    if req.relationship == Relationship::Myself && FamilyMember::self_exists(&state.db, scope.family_id, None).await? {
        return Err(ApiError::Conflict(SELF_EXISTS.to_string()));
    }

    let user_id = if req.link_to_current_user {
        if FamilyMember::find_by_user(&state.db, scope.user_id()).await?.is_some() {
            return Err(ApiError::Conflict("Your account is already linked to a member".to_string()));
        }
        Some(scope.user_id())
    } else {
        None
    };

    let member = FamilyMember::create(
        &state.db,
        scope.family_id,
        CreateMember {
            name: req.name.trim().to_string(),
            relationship: req.relationship,
            gender: req.gender,
            birth_date: req.birth_date,
            avatar: req.avatar,
            blood_type: req.blood_type,
            height: req.height,
            weight: req.weight,
            chronic_diseases: req.chronic_diseases,
            allergies: req.allergies,
            notes: req.notes,
            user_id,
        },
    )
    .await?;

    tracing::info!(member_id = %member.id, family_id = %scope.family_id, "member created");

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(scope.user_id()), AuditAction::Create, AuditResource::Member)
            .resource_id(member.id)
            .details(json!({ "name": member.name })),
    );

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn update_member(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<Json<FamilyMember>> {
    req.validate()?;
    require_member(&state.db, scope.family_id, id).await?;

    if req.relationship == Some(Relationship::Myself)
        && FamilyMember::self_exists(&state.db, scope.family_id, Some(id)).await?
    {
        return Err(ApiError::Conflict(SELF_EXISTS.to_string()));
    }

    let member = FamilyMember::update(&state.db, id, req.into()).await?;
    Ok(Json(member))
}

pub async fn delete_member(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let member = require_member(&state.db, scope.family_id, id).await?;
    FamilyMember::soft_delete(&state.db, member.id).await?;

    tracing::info!(member_id = %member.id, "member deleted");

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(scope.user_id()), AuditAction::Delete, AuditResource::Member)
            .resource_id(member.id)
            .details(json!({ "name": member.name })),
    );

    Ok(Json(MessageResponse {
        message: "Member deleted".to_string(),
    }))
}

/// Link the caller to a member
///
/// # Errors
///
/// - `409 Conflict`: Member is linked to someone else, or the caller is
///   already linked to a different member
pub async fn link_me(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FamilyMember>> {
    let member = require_member(&state.db, scope.family_id, id).await?;
    let user_id = scope.user_id();

    if member.user_id.is_some_and(|linked| linked != user_id) {
        return Err(ApiError::Conflict("This member is linked to another account".to_string()));
    }

    if let Some(current) = FamilyMember::find_by_user(&state.db, user_id).await? {
        if current.id != member.id {
            return Err(ApiError::Conflict("Your account is already linked to a member".to_string()));
        }
    }

    let member = FamilyMember::link_user(&state.db, member.id, user_id).await?;
    Ok(Json(member))
}

pub async fn unlink_me(State(state): State<AppState>, scope: FamilyScope) -> ApiResult<Json<MessageResponse>> {
    FamilyMember::unlink_user(&state.db, scope.user_id()).await?;

    Ok(Json(MessageResponse {
        message: "Unlinked".to_string(),
    }))
}
