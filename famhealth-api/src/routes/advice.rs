/// AI health advice
///
/// Advice is a scored report (summary, concerns, suggestions, action items)
/// generated from a member's recent records and analyzed documents. Each
/// generation is stored with a snapshot of what went into it.
///
/// # Endpoints
///
/// - `GET /api/v1/advice` - Latest advice across the family (max 20)
/// - `POST /api/v1/advice/generate` - Generate for one member (rate limited)
/// - `GET /api/v1/advice/check/:memberId` - Whether data changed since the last advice
/// - `GET /api/v1/advice/:id` - Detail
/// - `DELETE /api/v1/advice/:id` - Delete

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{FamilyScope, RequestMeta},
    routes::members::require_member,
    services::{
        ai::{ChatCompletionMessage, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE},
        audit, health_context,
        prompts::{advice_user_prompt, ADVICE_SYSTEM_PROMPT},
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use famhealth_shared::{
    domain::advice::{parse_advice_json, ActionItem, Concern, Suggestion},
    models::{
        advice::{CreateAdvice, HealthAdvice},
        audit_log::{AuditAction, AuditEntry, AuditResource},
        document::HealthDocument,
        record::HealthRecord,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

const LIST_LIMIT: i64 = 20;

const INSUFFICIENT_DATA: &str =
    "健康数据不足，请先添加健康记录或上传健康文档并完成 AI 规整后再生成建议";
const GENERATION_FAILED: &str = "AI 建议生成失败，请稍后重试";
const ADVICE_FORBIDDEN: &str = "无权访问此健康建议";

/// Loads advice and checks its member belongs to `family_id`
pub async fn require_advice(pool: &PgPool, family_id: Uuid, id: Uuid) -> ApiResult<HealthAdvice> {
    let advice = HealthAdvice::find(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Advice not found".to_string()))?;

    if advice.family_id != family_id {
        return Err(ApiError::Forbidden(ADVICE_FORBIDDEN.to_string()));
    }

    Ok(advice)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAdviceRequest {
    pub member_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAdviceQuery {
    pub member_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AdviceMember {
    pub id: Uuid,
    pub name: String,
}

/// Advice flattened for clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceResponse {
    pub id: Uuid,
    pub member_id: Uuid,
    pub member: AdviceMember,
    pub health_score: Option<i32>,
    pub summary: String,
    pub concerns: Vec<Concern>,
    pub suggestions: Vec<Suggestion>,
    pub action_items: Vec<ActionItem>,
    pub model_used: String,
    pub tokens_used: i32,
    pub generated_at: DateTime<Utc>,
}

impl From<HealthAdvice> for AdviceResponse {
    fn from(advice: HealthAdvice) -> Self {
        let content = advice.content.0;
        Self {
            id: advice.id,
            member_id: advice.member_id,
            member: AdviceMember {
                id: advice.member_id,
                name: advice.member_name,
            },
            health_score: advice.health_score,
            summary: content.summary,
            concerns: content.concerns,
            suggestions: content.suggestions,
            action_items: content.action_items,
            model_used: advice.model_used,
            tokens_used: advice.tokens_used,
            generated_at: advice.generated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDataCheck {
    pub has_new_data: bool,
    pub new_documents: i64,
    pub new_records: i64,
    pub last_advice_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list_advice(
    State(state): State<AppState>,
    scope: FamilyScope,
    Query(query): Query<ListAdviceQuery>,
) -> ApiResult<Json<Vec<AdviceResponse>>> {
    let advice = HealthAdvice::list(&state.db, scope.family_id, query.member_id, LIST_LIMIT).await?;
    Ok(Json(advice.into_iter().map(AdviceResponse::from).collect()))
}

pub async fn get_advice(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdviceResponse>> {
    let advice = require_advice(&state.db, scope.family_id, id).await?;
    Ok(Json(advice.into()))
}

pub async fn delete_advice(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    require_advice(&state.db, scope.family_id, id).await?;
    HealthAdvice::delete(&state.db, id).await?;

    Ok(Json(MessageResponse {
        message: "Advice deleted".to_string(),
    }))
}

/// Generate advice for one member
///
/// # Errors
///
/// - `400 Bad Request`: No records and no analyzed documents, AI not
///   configured, or the model reply could not be parsed
/// - `429 Too Many Requests`: Rate limited
pub async fn generate_advice(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Json(req): Json<GenerateAdviceRequest>,
) -> ApiResult<(StatusCode, Json<AdviceResponse>)> {
    let member = require_member(&state.db, scope.family_id, req.member_id).await?;

    let input = health_context::collect_advice_input(&state.db, &member).await?;
    if !input.has_enough_data() {
        return Err(ApiError::BadRequest(INSUFFICIENT_DATA.to_string()));
    }

    let settings = state.ai.settings(&state.db).await?;
    let prompt = advice_user_prompt(
        &input.profile,
        &input.records,
        input.document_summary.as_deref(),
        input.document_content.as_deref(),
    );

    let completion = state
        .ai
        .complete(
            &settings,
            vec![
                ChatCompletionMessage::system(ADVICE_SYSTEM_PROMPT),
                ChatCompletionMessage::user(prompt),
            ],
            DEFAULT_TEMPERATURE,
            DEFAULT_MAX_TOKENS,
        )
        .await?;

    let content = parse_advice_json(&completion.content).map_err(|e| {
        tracing::warn!(member_id = %member.id, error = %e, "unparseable advice reply");
        ApiError::BadRequest(GENERATION_FAILED.to_string())
    })?;

    let id = HealthAdvice::create(
        &state.db,
        CreateAdvice {
            member_id: member.id,
            content,
            data_snapshot: input.snapshot(),
            model_used: completion.model,
            tokens_used: completion.tokens_used,
        },
    )
    .await?;

    let advice = require_advice(&state.db, scope.family_id, id).await?;

    tracing::info!(
        advice_id = %id,
        member_id = %member.id,
        score = ?advice.health_score,
        tokens = advice.tokens_used,
        "advice generated"
    );

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(scope.user_id()), AuditAction::Generate, AuditResource::Advice)
            .resource_id(id)
            .details(json!({ "memberId": member.id, "healthScore": advice.health_score })),
    );

    Ok((StatusCode::CREATED, Json(advice.into())))
}

/// Whether a member has analyzed documents or records newer than their
/// latest advice
pub async fn check_new_data(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Json<NewDataCheck>> {
    require_member(&state.db, scope.family_id, member_id).await?;

    let last = HealthAdvice::last_generated_at(&state.db, member_id).await?;
    let new_documents = HealthDocument::count_analyzed_since(&state.db, member_id, last).await?;
    let new_records = HealthRecord::count_created_since(&state.db, member_id, last).await?;

    Ok(Json(NewDataCheck {
        has_new_data: new_documents > 0 || new_records > 0,
        new_documents,
        new_records,
        last_advice_date: last,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use famhealth_shared::domain::advice::AdviceContent;
    use sqlx::types::Json as SqlJson;

    #[test]
    fn test_response_flattens_content() {
        let advice = HealthAdvice {
            id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            content: SqlJson(AdviceContent {
                health_score: 78,
                summary: "总体良好".to_string(),
                concerns: vec![],
                suggestions: vec![],
                action_items: vec![ActionItem {
                    text: "每天步行30分钟".to_string(),
                    priority: "high".to_string(),
                }],
            }),
            health_score: Some(78),
            data_snapshot: json!({}),
            model_used: "qwen-plus".to_string(),
            tokens_used: 900,
            generated_at: Utc::now(),
            member_name: "爸爸".to_string(),
            family_id: Uuid::nil(),
        };
        let member_id = advice.member_id;

        let value = serde_json::to_value(AdviceResponse::from(advice)).unwrap();
        assert_eq!(value["healthScore"], 78);
        assert_eq!(value["summary"], "总体良好");
        assert_eq!(value["member"]["name"], "爸爸");
        assert_eq!(value["member"]["id"], json!(member_id));
        assert_eq!(value["actionItems"][0]["priority"], "high");
        assert!(value.get("familyId").is_none());
    }

    #[test]
    fn test_new_data_check_shape() {
        let value = serde_json::to_value(NewDataCheck {
            has_new_data: false,
            new_documents: 0,
            new_records: 0,
            last_advice_date: None,
        })
        .unwrap();

        assert_eq!(
            value,
            json!({ "hasNewData": false, "newDocuments": 0, "newRecords": 0, "lastAdviceDate": null })
        );
    }
}
