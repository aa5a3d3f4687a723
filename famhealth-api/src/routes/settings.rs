/// AI provider settings (admin only)
///
/// Keys saved here live in `system_config` and take precedence over the
/// environment. Keys are never returned in full.
///
/// # Endpoints
///
/// - `GET /api/v1/settings/api-config`
/// - `PUT /api/v1/settings/api-config`

use crate::{
    app::AppState,
    config::DEFAULT_DASHSCOPE_MODEL,
    error::{ApiError, ApiResult},
    extract::CurrentUser,
};
use axum::{extract::State, Json};
use famhealth_shared::models::system_config::{self, SystemConfig};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_AI_PROVIDER: &str = "auto";
const AI_PROVIDERS: [&str; 3] = ["alibaba", "google", "auto"];

/// Hides all but the first and last four characters of a key
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "****".to_string(),
        n => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{head}****{tail}")
        }
    }
}

/// Where an effective key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    Database,
    Env,
    None,
}

fn effective_key(stored: Option<String>, env: Option<&String>) -> (String, KeySource) {
    match (stored, env) {
        (Some(key), _) => (key, KeySource::Database),
        (None, Some(key)) => (key.clone(), KeySource::Env),
        (None, None) => (String::new(), KeySource::None),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfigResponse {
    pub dashscope_api_key: String,
    pub google_api_key: String,
    pub ai_provider: String,
    pub has_dashscope: bool,
    pub has_google: bool,
    pub dashscope_source: KeySource,
    pub google_source: KeySource,
    pub dashscope_model: String,
    pub gemini_model: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiConfigRequest {
    #[validate(length(max = 500))]
    pub dashscope_api_key: Option<String>,

    #[validate(length(max = 500))]
    pub google_api_key: Option<String>,

    pub ai_provider: Option<String>,

    #[validate(length(max = 100))]
    pub dashscope_model: Option<String>,

    #[validate(length(max = 100))]
    pub gemini_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn require_admin(state: &AppState, email: &str) -> ApiResult<()> {
    if state.is_admin(email) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin access required".to_string()))
    }
}

pub async fn get_api_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<ApiConfigResponse>> {
    require_admin(&state, &user.email)?;

    let pool = &state.db;
    let env = &state.config.ai;

    let (dashscope_key, dashscope_source) = effective_key(
        SystemConfig::get_non_empty(pool, system_config::DASHSCOPE_API_KEY).await?,
        env.dashscope_api_key.as_ref(),
    );
    let (google_key, google_source) = effective_key(
        SystemConfig::get_non_empty(pool, system_config::GOOGLE_API_KEY).await?,
        env.google_api_key.as_ref(),
    );

    let ai_provider = SystemConfig::get_non_empty(pool, system_config::AI_PROVIDER)
        .await?
        .unwrap_or_else(|| DEFAULT_AI_PROVIDER.to_string());
    let dashscope_model = SystemConfig::get_non_empty(pool, system_config::DASHSCOPE_MODEL)
        .await?
        .unwrap_or_else(|| {
            if env.dashscope_model.is_empty() {
                DEFAULT_DASHSCOPE_MODEL.to_string()
            } else {
                env.dashscope_model.clone()
            }
        });
    let gemini_model = SystemConfig::get_non_empty(pool, system_config::GEMINI_MODEL)
        .await?
        .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

    Ok(Json(ApiConfigResponse {
        dashscope_api_key: mask_key(&dashscope_key),
        google_api_key: mask_key(&google_key),
        ai_provider,
        has_dashscope: dashscope_source != KeySource::None,
        has_google: google_source != KeySource::None,
        dashscope_source,
        google_source,
        dashscope_model,
        gemini_model,
    }))
}

/// Stores `value` under `key`; an empty string removes the row
async fn store(pool: &PgPool, key: &str, value: Option<&str>) -> Result<(), sqlx::Error> {
    match value.map(str::trim) {
        None => Ok(()),
        Some("") => SystemConfig::delete(pool, key).await.map(|_| ()),
        Some(v) => SystemConfig::set(pool, key, v).await,
    }
}

/// Update provider settings
///
/// # Errors
///
/// - `400 Bad Request`: `aiProvider` is not alibaba, google or auto
/// - `403 Forbidden`: Caller is not an admin
pub async fn update_api_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateApiConfigRequest>,
) -> ApiResult<Json<MessageResponse>> {
    require_admin(&state, &user.email)?;
    req.validate()?;

    if let Some(provider) = req.ai_provider.as_deref() {
        if !provider.is_empty() && !AI_PROVIDERS.contains(&provider) {
            return Err(ApiError::invalid_field("aiProvider", "must be alibaba, google or auto"));
        }
    }

    let pool = &state.db;
    store(pool, system_config::DASHSCOPE_API_KEY, req.dashscope_api_key.as_deref()).await?;
    store(pool, system_config::GOOGLE_API_KEY, req.google_api_key.as_deref()).await?;
    store(pool, system_config::AI_PROVIDER, req.ai_provider.as_deref()).await?;
    store(pool, system_config::DASHSCOPE_MODEL, req.dashscope_model.as_deref()).await?;
    store(pool, system_config::GEMINI_MODEL, req.gemini_model.as_deref()).await?;

    tracing::info!(updated_by = %user.email, "AI settings updated");

    Ok(Json(MessageResponse {
        message: "Settings saved".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("abc"), "****");
        assert_eq!(mask_key("12345678"), "****");
        assert_eq!(mask_key("sk-1234567890abcd"), "sk-1****abcd");
    }

    #[test]
    fn test_effective_key_prefers_database() {
        let env = Some("env-key".to_string());

        let (key, source) = effective_key(Some("db-key".to_string()), env.as_ref());
        assert_eq!(key, "db-key");
        assert_eq!(source, KeySource::Database);

        let (key, source) = effective_key(None, env.as_ref());
        assert_eq!(key, "env-key");
        assert_eq!(source, KeySource::Env);

        assert_eq!(effective_key(None, None), (String::new(), KeySource::None));
    }

    #[test]
    fn test_key_source_serializes_lowercase() {
        assert_eq!(serde_json::to_value(KeySource::Database).unwrap(), "database");
        assert_eq!(serde_json::to_value(KeySource::None).unwrap(), "none");
    }
}
