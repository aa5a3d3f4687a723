/// Health assistant chat
///
/// A session is a conversation about one member, optionally opened from an
/// item of an advice report. Replies are streamed over SSE while the full
/// answer is collected and stored once the model finishes.
///
/// # Endpoints
///
/// - `GET /api/v1/chat/sessions` - Sessions, most recently active first
/// - `POST /api/v1/chat/sessions` - Create
/// - `GET /api/v1/chat/sessions/:id` - Session with its transcript
/// - `DELETE /api/v1/chat/sessions/:id` - Delete with its messages
/// - `POST /api/v1/chat/sessions/:id/messages` - Send a message (SSE, rate limited)
/// - `GET /api/v1/chat/advice/:adviceId/stats` - Session counts per advice item
/// - `GET /api/v1/chat/advice/:adviceId/sessions` - Sessions opened from an advice
///
/// # Reply stream
///
/// ```text
/// event: message
/// data: {"content":"您好","done":false}
///
/// event: done
/// data: {"tokensUsed":356}
/// ```
///
/// A failed model call sends `event: error` with `{"error": "…"}` instead of
/// `done`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::FamilyScope,
    routes::{advice::require_advice, json_event, members::require_member, sse_response, SSE_CHANNEL_CAPACITY},
    services::{
        ai::{AiClient, AiSettings, ChatCompletionMessage},
        health_context,
        prompts::chat_system_prompt,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    Json,
};
use famhealth_shared::models::{
    advice::HealthAdvice,
    chat::{AdviceChatStats, ChatMessage, ChatRole, ChatSession, ChatSessionSummary, CreateSession, SourceItemType},
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::convert::Infallible;
use tokio::sync::mpsc;
use uuid::Uuid;
use validator::Validate;

/// Messages sent to the model as conversation history
const HISTORY_LIMIT: i64 = 20;

const TITLE_CHARS: usize = 20;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub member_id: Uuid,

    #[validate(length(min = 1, max = 100, message = "Title must be 1 to 100 characters"))]
    pub title: Option<String>,

    pub source_advice_id: Option<Uuid>,

    pub source_item_type: Option<SourceItemType>,

    #[validate(range(min = 0))]
    pub source_item_index: Option<i32>,

    #[validate(length(max = 200))]
    pub source_item_title: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub member_id: Option<Uuid>,

    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0, message = "offset must not be negative"))]
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 5000, message = "Message must be 1 to 5000 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceSessionsQuery {
    pub item_type: Option<SourceItemType>,
    pub item_index: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
struct MessageChunk<'a> {
    content: &'a str,
    done: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamDone {
    tokens_used: i32,
}

#[derive(Debug, Serialize)]
struct StreamError<'a> {
    error: &'a str,
}

/// Title derived from the first question of a session
fn session_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() > TITLE_CHARS {
        let mut title: String = trimmed.chars().take(TITLE_CHARS).collect();
        title.push_str("...");
        title
    } else {
        trimmed.to_string()
    }
}

fn to_completion_message(message: &ChatMessage) -> ChatCompletionMessage {
    match message.role {
        ChatRole::User => ChatCompletionMessage::user(message.content.as_str()),
        ChatRole::Assistant => ChatCompletionMessage::assistant(message.content.as_str()),
    }
}

async fn require_session(pool: &PgPool, family_id: Uuid, id: Uuid) -> ApiResult<ChatSession> {
    ChatSession::find_in_family(pool, id, family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat session not found".to_string()))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    scope: FamilyScope,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Vec<ChatSessionSummary>>> {
    query.validate()?;

    let sessions = ChatSession::list(&state.db, scope.family_id, query.member_id, query.limit, query.offset).await?;
    Ok(Json(sessions))
}

/// Create a session
///
/// # Errors
///
/// - `403 Forbidden`: Member or source advice belongs to another family
/// - `404 Not Found`: Member or source advice does not exist
pub async fn create_session(
    State(state): State<AppState>,
    scope: FamilyScope,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    req.validate()?;
    require_member(&state.db, scope.family_id, req.member_id).await?;

    if let Some(advice_id) = req.source_advice_id {
        require_advice(&state.db, scope.family_id, advice_id).await?;
    }

    let session = ChatSession::create(
        &state.db,
        CreateSession {
            family_id: scope.family_id,
            created_by: scope.user_id(),
            member_id: req.member_id,
            title: req.title.map(|t| t.trim().to_string()),
            source_advice_id: req.source_advice_id,
            source_item_type: req.source_item_type,
            source_item_index: req.source_item_index,
            source_item_title: req.source_item_title,
        },
    )
    .await?;

    tracing::debug!(session_id = %session.id, member_id = %session.member_id, "chat session created");

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionDetail>> {
    let session = require_session(&state.db, scope.family_id, id).await?;
    let messages = ChatMessage::list(&state.db, id).await?;

    Ok(Json(SessionDetail { session, messages }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    require_session(&state.db, scope.family_id, id).await?;
    ChatSession::delete(&state.db, id).await?;

    Ok(Json(DeleteResponse { success: true }))
}

/// Send a message and stream the reply
///
/// The user message is stored before the stream opens. A non-empty
/// assistant reply is stored once the model finishes, even if the client
/// has disconnected by then.
///
/// # Errors
///
/// - `400 Bad Request`: Empty or oversized message, AI not configured
/// - `404 Not Found`: Session or its member no longer exists
/// - `429 Too Many Requests`: Rate limited
pub async fn send_message(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    req.validate()?;

    let session = require_session(&state.db, scope.family_id, id).await?;
    let settings = state.ai.settings(&state.db).await?;
    let member = require_member(&state.db, scope.family_id, session.member_id).await?;

    ChatMessage::create(&state.db, session.id, ChatRole::User, &req.content, None).await?;
    let history = ChatMessage::recent(&state.db, session.id, HISTORY_LIMIT).await?;

    let advice = match session.source_advice_id {
        Some(advice_id) => HealthAdvice::find(&state.db, advice_id).await?.map(|a| a.content.0),
        None => None,
    };
    let context = health_context::collect_chat_context(&state.db, &member, advice).await?;

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatCompletionMessage::system(chat_system_prompt(&context)));
    messages.extend(history.iter().map(to_completion_message));

    let title = (history.len() == 1).then(|| session_title(&req.content));

    let (tx, rx) = mpsc::channel(SSE_CHANNEL_CAPACITY);
    tokio::spawn(relay_reply(
        state.db.clone(),
        state.ai.clone(),
        settings,
        session.id,
        messages,
        title,
        tx,
    ));

    Ok(sse_response(rx))
}

/// Streams the model reply to `tx`, then stores it
async fn relay_reply(
    db: PgPool,
    ai: AiClient,
    settings: AiSettings,
    session_id: Uuid,
    messages: Vec<ChatCompletionMessage>,
    title: Option<String>,
    tx: mpsc::Sender<Event>,
) {
    let (delta_tx, mut delta_rx) = mpsc::channel::<String>(SSE_CHANNEL_CAPACITY);

    let forward = async {
        while let Some(delta) = delta_rx.recv().await {
            let chunk = MessageChunk {
                content: &delta,
                done: false,
            };
            // A closed receiver means the client left; keep draining so the
            // model call runs to completion.
            let _ = tx.send(json_event(Some("message"), &chunk)).await;
        }
    };

    let (result, ()) = tokio::join!(ai.stream_chat(&settings, messages, delta_tx), forward);

    match result {
        Ok(outcome) => {
            if outcome.content.is_empty() {
                tracing::warn!(%session_id, "model returned an empty reply, nothing stored");
            } else if let Err(e) = ChatMessage::create(
                &db,
                session_id,
                ChatRole::Assistant,
                &outcome.content,
                Some(outcome.tokens_used),
            )
            .await
            {
                tracing::error!(%session_id, error = %e, "failed to store assistant message");
            }

            if let Some(title) = title {
                if let Err(e) = ChatSession::set_title(&db, session_id, &title).await {
                    tracing::warn!(%session_id, error = %e, "failed to set session title");
                }
            }

            tracing::info!(%session_id, tokens = outcome.tokens_used, "chat reply completed");

            let _ = tx
                .send(json_event(
                    Some("done"),
                    &StreamDone {
                        tokens_used: outcome.tokens_used,
                    },
                ))
                .await;
        }
        Err(e) => {
            tracing::warn!(%session_id, error = %e, "chat reply failed");
            let message = e.to_string();
            let _ = tx.send(json_event(Some("error"), &StreamError { error: &message })).await;
        }
    }

    if let Err(e) = ChatSession::touch(&db, session_id).await {
        tracing::warn!(%session_id, error = %e, "failed to touch session");
    }
}

pub async fn advice_stats(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(advice_id): Path<Uuid>,
) -> ApiResult<Json<AdviceChatStats>> {
    require_advice(&state.db, scope.family_id, advice_id).await?;
    Ok(Json(ChatSession::advice_stats(&state.db, scope.family_id, advice_id).await?))
}

pub async fn advice_sessions(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(advice_id): Path<Uuid>,
    Query(query): Query<AdviceSessionsQuery>,
) -> ApiResult<Json<Vec<ChatSession>>> {
    require_advice(&state.db, scope.family_id, advice_id).await?;

    let sessions =
        ChatSession::list_for_advice(&state.db, scope.family_id, advice_id, query.item_type, query.item_index).await?;
    Ok(Json(sessions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_session_title() {
        assert_eq!(session_title("  血压偏高怎么办  "), "血压偏高怎么办");
        assert_eq!(session_title(&"好".repeat(20)), "好".repeat(20));
        assert_eq!(session_title(&"好".repeat(21)), format!("{}...", "好".repeat(20)));
    }

    #[test]
    fn test_list_query_defaults_and_bounds() {
        let query: ListSessionsQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query.limit, 20);
        assert_eq!(query.offset, 0);
        assert!(query.validate().is_ok());

        let query: ListSessionsQuery = serde_json::from_value(json!({ "limit": 101 })).unwrap();
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_message_length_limits() {
        let empty = SendMessageRequest { content: String::new() };
        assert!(empty.validate().is_err());

        let long = SendMessageRequest {
            content: "a".repeat(5001),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_history_roles_map_to_completion_roles() {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            role: ChatRole::Assistant,
            content: "hi".to_string(),
            tokens_used: Some(3),
            created_at: Utc::now(),
        };

        let converted = to_completion_message(&message);
        assert_eq!(converted.role, "assistant");
        assert_eq!(converted.content, json!("hi"));

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
    }

    #[test]
    fn test_stream_payload_shapes() {
        let chunk = serde_json::to_value(MessageChunk {
            content: "您好",
            done: false,
        })
        .unwrap();
        assert_eq!(chunk, json!({ "content": "您好", "done": false }));

        let done = serde_json::to_value(StreamDone { tokens_used: 12 }).unwrap();
        assert_eq!(done, json!({ "tokensUsed": 12 }));
    }
}
