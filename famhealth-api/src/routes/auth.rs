/// Authentication endpoints
///
/// This module provides user authentication endpoints:
/// - Registration
/// - Login
/// - Token refresh
///
/// Registration and login both pass through the whitelist gate, see
/// [`crate::routes::whitelist::ensure_allowed`].
///
/// # Endpoints
///
/// - `POST /api/v1/auth/register` - Register new user
/// - `POST /api/v1/auth/login` - Login and get tokens
/// - `POST /api/v1/auth/refresh` - Exchange a refresh token for a new pair

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::RequestMeta,
    routes::whitelist,
    services::audit,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use famhealth_shared::{
    auth::{jwt, password},
    models::{
        allowed_email::normalize_email,
        audit_log::{AuditAction, AuditEntry, AuditResource},
        user::{CreateUser, User},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "invalid email or password";

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Display name
    #[validate(length(min = 2, max = 50, message = "Name must be 2 to 50 characters"))]
    pub name: String,

    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, max = 100, message = "Password must be 6 to 100 characters"))]
    pub password: String,
}

/// Register response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Login response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: LoginUser,

    /// Access token (15m)
    pub access_token: String,

    /// Refresh token (7d)
    pub refresh_token: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/register
/// Content-Type: application/json
///
/// {
///   "name": "Ann",
///   "email": "ann@example.com",
///   "password": "secret1"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `403 Forbidden`: Email is not whitelisted
/// - `409 Conflict`: Email already exists
pub async fn register(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    req.validate()?;

    let email = normalize_email(&req.email);
    let mut conn = state.db.acquire().await?;
    whitelist::ensure_allowed(&mut conn, &email).await?;
    drop(conn);

    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email,
            password_hash,
            name: req.name.trim().to_string(),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "user registered");

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(user.id), AuditAction::Register, AuditResource::User).resource_id(user.id),
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }),
    ))
}

/// Login with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password
/// - `403 Forbidden`: Email is not whitelisted
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let mut conn = state.db.acquire().await?;
    whitelist::ensure_allowed(&mut conn, &user.email).await?;
    drop(conn);

    let tokens = jwt::issue_token_pair(user.id, &user.email, state.jwt_secret())?;

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(user.id), AuditAction::Login, AuditResource::User).resource_id(user.id),
    );

    Ok(Json(LoginResponse {
        user: LoginUser {
            id: user.id,
            email: user.email,
            name: user.name,
        },
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// Exchange a refresh token for a new token pair
///
/// # Errors
///
/// - `401 Unauthorized`: Token invalid, expired, not a refresh token, or the
///   user was deleted
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<jwt::TokenPair>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    let tokens = jwt::issue_token_pair(user.id, &user.email, state.jwt_secret())?;

    Ok(Json(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let valid = RegisterRequest {
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(valid.validate().is_ok());

        let short_name = RegisterRequest {
            name: "A".to_string(),
            ..valid_request()
        };
        assert!(short_name.validate().is_err());

        let short_password = RegisterRequest {
            password: "12345".to_string(),
            ..valid_request()
        };
        assert!(short_password.validate().is_err());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            ..valid_request()
        };
        assert!(bad_email.validate().is_err());
    }

    fn valid_request() -> RegisterRequest {
        RegisterRequest {
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            password: "secret1".to_string(),
        }
    }

    #[test]
    fn test_login_response_shape() {
        let response = LoginResponse {
            user: LoginUser {
                id: Uuid::nil(),
                email: "ann@example.com".to_string(),
                name: "Ann".to_string(),
            },
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
        assert_eq!(json["user"]["email"], "ann@example.com");
    }
}
