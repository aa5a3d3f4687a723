/// Request extractors shared by the resource handlers
///
/// - [`CurrentUser`]: the authenticated user row
/// - [`FamilyScope`]: the authenticated user plus the family they belong to;
///   rejects with 403 when the user has no family yet
/// - [`RequestMeta`]: method, path, client address and user agent for audit entries
///
/// Both user extractors expect the JWT middleware to have stored an
/// [`AuthContext`] in the request extensions.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use famhealth_shared::{auth::middleware::AuthContext, models::user::User};
use std::convert::Infallible;
use uuid::Uuid;

use crate::{app::AppState, error::ApiError};

/// The caller's user row
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Missing authentication".to_string()))?;

        let user = User::find_by_id(&state.db, auth.user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

        Ok(CurrentUser(user))
    }
}

/// The caller together with their family id
#[derive(Debug, Clone)]
pub struct FamilyScope {
    pub user: User,
    pub family_id: Uuid,
}

impl FamilyScope {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for FamilyScope {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        let family_id = user.family_id.ok_or_else(ApiError::no_family)?;

        Ok(FamilyScope { user, family_id })
    }
}

/// Request details recorded next to audit entries
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    fn from_parts(parts: &Parts) -> Self {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let ip = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .or_else(|| header_str("x-real-ip"));

        Self {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            ip,
            user_agent: header_str(header::USER_AGENT.as_str()),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestMeta::from_parts(parts))
    }
}
