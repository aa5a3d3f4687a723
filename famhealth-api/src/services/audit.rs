//! Background audit logging
//!
//! Audit writes never fail a request: the insert runs on its own task and
//! errors only reach the log.

use famhealth_shared::models::audit_log::AuditEntry;
use sqlx::PgPool;

use crate::extract::RequestMeta;

/// Stores `entry` without waiting for the database
pub fn record(pool: &PgPool, entry: AuditEntry) -> tokio::task::JoinHandle<()> {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = entry.insert(&pool).await {
            tracing::error!(
                error = %e,
                action = entry.action.as_str(),
                resource = entry.resource.as_str(),
                "failed to write audit log"
            );
        }
    })
}

/// Same as [`record`], tagging the entry with the originating request
pub fn record_request(pool: &PgPool, meta: &RequestMeta, entry: AuditEntry) -> tokio::task::JoinHandle<()> {
    let entry = entry.request(
        meta.method.clone(),
        meta.path.clone(),
        meta.ip.clone(),
        meta.user_agent.clone(),
    );
    record(pool, entry)
}
