/// Public client configuration
///
/// ```text
/// GET /api/v1/config/public
/// ```
///
/// Unauthenticated; lets the client decide whether to show the login screen.

use axum::Json;
use serde::Serialize;

pub const APP_NAME: &str = "家庭健康管理";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub auth_required: bool,
    pub app_name: &'static str,
}

pub async fn public_config() -> Json<PublicConfig> {
    Json(PublicConfig {
        auth_required: true,
        app_name: APP_NAME,
    })
}
