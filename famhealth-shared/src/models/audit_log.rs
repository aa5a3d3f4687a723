/// Audit trail of security-relevant actions
///
/// Rows are append-only. Writes happen off the request path, see the API's
/// audit service.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    Logout,
    Register,
    Create,
    Update,
    Delete,
    Generate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::Register => "REGISTER",
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Generate => "GENERATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResource {
    User,
    Member,
    Document,
    Record,
    Advice,
    Chat,
}

impl AuditResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResource::User => "USER",
            AuditResource::Member => "MEMBER",
            AuditResource::Document => "DOCUMENT",
            AuditResource::Record => "RECORD",
            AuditResource::Advice => "ADVICE",
            AuditResource::Chat => "CHAT",
        }
    }
}

/// One audit entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<Uuid>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(user_id: Option<Uuid>, action: AuditAction, resource: AuditResource) -> Self {
        Self {
            user_id,
            action,
            resource,
            resource_id: None,
            method: None,
            path: None,
            ip: None,
            user_agent: None,
            details: None,
        }
    }

    pub fn resource_id(mut self, id: Uuid) -> Self {
        self.resource_id = Some(id);
        self
    }

    /// Attaches the HTTP request that caused the action
    pub fn request(
        mut self,
        method: impl Into<String>,
        path: impl Into<String>,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, resource, resource_id, method, path, ip, user_agent, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(self.user_id)
        .bind(self.action.as_str())
        .bind(self.resource.as_str())
        .bind(self.resource_id)
        .bind(&self.method)
        .bind(&self.path)
        .bind(&self.ip)
        .bind(&self.user_agent)
        .bind(&self.details)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let id = Uuid::new_v4();
        let entry = AuditEntry::new(None, AuditAction::Generate, AuditResource::Advice)
            .resource_id(id)
            .details(serde_json::json!({"memberId": id}))
            .request("POST", "/api/v1/advice/generate", None, Some("test-agent".to_string()));

        assert_eq!(entry.action.as_str(), "GENERATE");
        assert_eq!(entry.resource.as_str(), "ADVICE");
        assert_eq!(entry.resource_id, Some(id));
        assert!(entry.details.is_some());
        assert_eq!(entry.method.as_deref(), Some("POST"));
        assert_eq!(entry.user_agent.as_deref(), Some("test-agent"));
    }
}
