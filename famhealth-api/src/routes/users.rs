/// Current user profile
///
/// # Endpoints
///
/// - `GET /api/v1/users/me` - Profile plus the number of members in the family
/// - `PATCH /api/v1/users/me` - Rename
/// - `PATCH /api/v1/users/me/password` - Change password

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::CurrentUser,
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use famhealth_shared::{
    auth::password,
    models::{member::FamilyMember, user::User},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub family_member_count: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be 2 to 50 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 6, max = 100, message = "Password must be 6 to 100 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn profile(state: &AppState, user: User) -> ApiResult<ProfileResponse> {
    let family_member_count = match user.family_id {
        Some(family_id) => FamilyMember::count_by_family(&state.db, family_id).await?,
        None => 0,
    };

    Ok(ProfileResponse {
        id: user.id,
        email: user.email,
        name: user.name,
        created_at: user.created_at,
        updated_at: user.updated_at,
        family_member_count,
    })
}

pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ProfileResponse>> {
    Ok(Json(profile(&state, user).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    req.validate()?;

    let user = match req.name {
        Some(name) => User::update_name(&state.db, user.id, name.trim()).await?,
        None => user,
    };

    Ok(Json(profile(&state, user).await?))
}

/// Change password
///
/// # Errors
///
/// - `401 Unauthorized`: `currentPassword` does not match
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    if !password::verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized("Current password is incorrect".to_string()));
    }

    let hash = password::hash_password(&req.new_password)?;
    User::update_password(&state.db, user.id, &hash).await?;

    tracing::info!(user_id = %user.id, "password changed");

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}
