/// Liveness probe at `GET /health`, outside `/api/v1` and without auth
///
/// The service reports `degraded` rather than failing when Postgres does not
/// answer, so load balancers can tell a dead process from a sick database.

use crate::app::AppState;
use axum::{extract::State, Json};
use famhealth_shared::db::pool::health_check as ping_database;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

impl HealthResponse {
    fn new(database_up: bool) -> Self {
        let (status, database) = if database_up {
            ("healthy", "connected")
        } else {
            ("degraded", "disconnected")
        };

        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database,
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_up = match ping_database(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "database ping failed");
            false
        }
    };

    Json(HealthResponse::new(database_up))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_down_is_degraded() {
        let down = HealthResponse::new(false);
        assert_eq!(down.status, "degraded");
        assert_eq!(down.database, "disconnected");

        let up = HealthResponse::new(true);
        assert_eq!(up.status, "healthy");
        assert!(!up.version.is_empty());
    }
}
