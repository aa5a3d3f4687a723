/// Chat sessions and messages
///
/// A session belongs to a family and is about one member. Sessions opened from
/// an advice report remember which concern, suggestion or action item started
/// them, so the advice view can show how many conversations each item has.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "chat_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Role name used by chat-completion APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Which kind of advice item a session was opened from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceItemType {
    Concern,
    Suggestion,
    Action,
}

impl SourceItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceItemType::Concern => "concern",
            SourceItemType::Suggestion => "suggestion",
            SourceItemType::Action => "action",
        }
    }
}

impl TryFrom<String> for SourceItemType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "concern" => Ok(SourceItemType::Concern),
            "suggestion" => Ok(SourceItemType::Suggestion),
            "action" => Ok(SourceItemType::Action),
            other => Err(format!("unknown source item type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub family_id: Uuid,
    pub created_by: Uuid,
    pub member_id: Uuid,
    pub title: String,
    pub source_advice_id: Option<Uuid>,
    pub source_item_type: Option<String>,
    pub source_item_index: Option<i32>,
    pub source_item_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_name: String,
}

/// Session list entry with a preview of the newest message
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub session: ChatSession,
    pub last_message: Option<String>,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub tokens_used: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub family_id: Uuid,
    pub created_by: Uuid,
    pub member_id: Uuid,
    pub title: Option<String>,
    pub source_advice_id: Option<Uuid>,
    pub source_item_type: Option<SourceItemType>,
    pub source_item_index: Option<i32>,
    pub source_item_title: Option<String>,
}

/// Session counts per advice item index, grouped by item type
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AdviceChatStats {
    pub concern: BTreeMap<i32, i64>,
    pub suggestion: BTreeMap<i32, i64>,
    pub action: BTreeMap<i32, i64>,
}

const SESSION_SELECT: &str = r#"
    SELECT s.id, s.family_id, s.created_by, s.member_id, s.title, s.source_advice_id,
           s.source_item_type, s.source_item_index, s.source_item_title,
           s.created_at, s.updated_at, m.name AS member_name
    FROM chat_sessions s
    JOIN family_members m ON m.id = s.member_id
"#;

const MESSAGE_COLUMNS: &str = "id, session_id, role, content, tokens_used, created_at";

/// Characters of the newest message shown in session lists
pub const LAST_MESSAGE_PREVIEW_CHARS: i32 = 50;

impl ChatSession {
    pub async fn create(pool: &PgPool, data: CreateSession) -> Result<Self, sqlx::Error> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO chat_sessions
                (family_id, created_by, member_id, title, source_advice_id,
                 source_item_type, source_item_index, source_item_title)
            VALUES ($1, $2, $3, COALESCE($4, '新对话'), $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(data.family_id)
        .bind(data.created_by)
        .bind(data.member_id)
        .bind(data.title)
        .bind(data.source_advice_id)
        .bind(data.source_item_type.map(|t| t.as_str()))
        .bind(data.source_item_index)
        .bind(data.source_item_title)
        .fetch_one(pool)
        .await?;

        Self::find_in_family(pool, id, data.family_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_in_family(pool: &PgPool, id: Uuid, family_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("{SESSION_SELECT} WHERE s.id = $1 AND s.family_id = $2");

        sqlx::query_as::<_, ChatSession>(&sql)
            .bind(id)
            .bind(family_id)
            .fetch_optional(pool)
            .await
    }

    /// Sessions of a family, most recently active first
    pub async fn list(
        pool: &PgPool,
        family_id: Uuid,
        member_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatSessionSummary>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT s.id, s.family_id, s.created_by, s.member_id, s.title, s.source_advice_id,
                   s.source_item_type, s.source_item_index, s.source_item_title,
                   s.created_at, s.updated_at, m.name AS member_name,
                   (SELECT LEFT(cm.content, {LAST_MESSAGE_PREVIEW_CHARS}) FROM chat_messages cm
                     WHERE cm.session_id = s.id ORDER BY cm.created_at DESC LIMIT 1) AS last_message,
                   (SELECT COUNT(*) FROM chat_messages cm WHERE cm.session_id = s.id) AS message_count
            FROM chat_sessions s
            JOIN family_members m ON m.id = s.member_id
            WHERE s.family_id = $1 AND ($2::uuid IS NULL OR s.member_id = $2)
            ORDER BY s.updated_at DESC
            LIMIT $3 OFFSET $4
            "#
        );

        sqlx::query_as::<_, ChatSessionSummary>(&sql)
            .bind(family_id)
            .bind(member_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Sessions opened from one advice report, optionally narrowed to an item
    pub async fn list_for_advice(
        pool: &PgPool,
        family_id: Uuid,
        advice_id: Uuid,
        item_type: Option<SourceItemType>,
        item_index: Option<i32>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"{SESSION_SELECT}
            WHERE s.family_id = $1 AND s.source_advice_id = $2
              AND ($3::text IS NULL OR s.source_item_type = $3)
              AND ($4::int IS NULL OR s.source_item_index = $4)
            ORDER BY s.updated_at DESC
            "#
        );

        sqlx::query_as::<_, ChatSession>(&sql)
            .bind(family_id)
            .bind(advice_id)
            .bind(item_type.map(|t| t.as_str()))
            .bind(item_index)
            .fetch_all(pool)
            .await
    }

    pub async fn advice_stats(pool: &PgPool, family_id: Uuid, advice_id: Uuid) -> Result<AdviceChatStats, sqlx::Error> {
        let rows: Vec<(String, i32, i64)> = sqlx::query_as(
            r#"
            SELECT source_item_type, source_item_index, COUNT(*)
            FROM chat_sessions
            WHERE family_id = $1 AND source_advice_id = $2
              AND source_item_type IS NOT NULL AND source_item_index IS NOT NULL
            GROUP BY source_item_type, source_item_index
            "#,
        )
        .bind(family_id)
        .bind(advice_id)
        .fetch_all(pool)
        .await?;

        let mut stats = AdviceChatStats::default();
        for (item_type, index, count) in rows {
            let bucket = match SourceItemType::try_from(item_type) {
                Ok(SourceItemType::Concern) => &mut stats.concern,
                Ok(SourceItemType::Suggestion) => &mut stats.suggestion,
                Ok(SourceItemType::Action) => &mut stats.action,
                Err(_) => continue,
            };
            bucket.insert(index, count);
        }

        Ok(stats)
    }

    pub async fn set_title(pool: &PgPool, id: Uuid, title: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chat_sessions SET title = $2 WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn touch(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chat_sessions SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl ChatMessage {
    pub async fn create(
        pool: &PgPool,
        session_id: Uuid,
        role: ChatRole,
        content: &str,
        tokens_used: Option<i32>,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            "INSERT INTO chat_messages (session_id, role, content, tokens_used)
             VALUES ($1, $2, $3, $4) RETURNING {MESSAGE_COLUMNS}"
        );

        sqlx::query_as::<_, ChatMessage>(&sql)
            .bind(session_id)
            .bind(role)
            .bind(content)
            .bind(tokens_used)
            .fetch_one(pool)
            .await
    }

    /// Full transcript, oldest first
    pub async fn list(pool: &PgPool, session_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = $1 ORDER BY created_at ASC"
        );

        sqlx::query_as::<_, ChatMessage>(&sql)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// The newest `limit` messages, returned oldest first
    pub async fn recent(pool: &PgPool, session_id: Uuid, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS} FROM chat_messages
                WHERE session_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC
            "#
        );

        sqlx::query_as::<_, ChatMessage>(&sql)
            .bind(session_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names() {
        assert_eq!(serde_json::to_string(&ChatRole::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(ChatRole::User.as_str(), "user");
    }

    #[test]
    fn test_source_item_type_parse() {
        assert_eq!(SourceItemType::try_from("action".to_string()), Ok(SourceItemType::Action));
        assert!(SourceItemType::try_from("other".to_string()).is_err());
        let parsed: SourceItemType = serde_json::from_str("\"concern\"").unwrap();
        assert_eq!(parsed, SourceItemType::Concern);
    }

    #[test]
    fn test_stats_serialize_with_string_keys() {
        let mut stats = AdviceChatStats::default();
        stats.concern.insert(0, 2);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["concern"]["0"], 2);
        assert!(json["action"].as_object().unwrap().is_empty());
    }
}
