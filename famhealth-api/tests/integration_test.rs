/// Integration tests for the family health API
///
/// These tests drive the full router against a real database:
/// - Public endpoints and authentication
/// - Family creation and joining
/// - Members, health records and reference data
/// - Vaccination schedules and checkup plans
/// - Leaving a family and the registration whitelist
/// - Chat, advice and document analysis against a stand-in model
///
/// Run with: cargo test -p famhealth-api --test integration_test

mod common;

use axum::http::StatusCode;
use common::{create_user, send_as, token_for, TestContext, STUB_TOKENS};
use famhealth_api::error::ApiError;
use famhealth_api::routes::whitelist::ensure_allowed;
use famhealth_shared::models::allowed_email::AllowedEmail;
use famhealth_shared::models::document::HealthDocument;
use famhealth_shared::models::family::Family;
use famhealth_shared::models::user::User;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

async fn create_member(ctx: &TestContext, name: &str, relationship: &str, birth_date: &str) -> Value {
    let (status, body) = ctx
        .send(
            "POST",
            "/api/v1/members",
            Some(json!({
                "name": name,
                "relationship": relationship,
                "gender": "MALE",
                "birthDate": birth_date,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create member failed: {body}");
    body
}

#[tokio::test]
async fn test_health_and_public_config() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = send_as(&ctx.app, None, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");

    let (status, body) = send_as(&ctx.app, None, "GET", "/api/v1/config/public", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authRequired"], true);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _) = send_as(&ctx.app, None, "GET", "/api/v1/members", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_as(&ctx.app, Some("Bearer not-a-token"), "GET", "/api/v1/members", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_register_and_login() {
    let ctx = TestContext::new().await.unwrap();
    let email = format!("new-{}@example.com", uuid::Uuid::new_v4());

    let (status, _) = send_as(
        &ctx.app,
        None,
        "POST",
        "/api/v1/auth/register",
        Some(json!({ "name": "新用户", "email": email, "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "unlisted email must be rejected");

    AllowedEmail::add(&ctx.db, &email, "tests").await.unwrap();

    let (status, body) = send_as(
        &ctx.app,
        None,
        "POST",
        "/api/v1/auth/register",
        Some(json!({ "name": "新用户", "email": email, "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    assert_eq!(body["email"], email);

    let (status, _) = send_as(
        &ctx.app,
        None,
        "POST",
        "/api/v1/auth/login",
        Some(json!({ "email": email, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_as(
        &ctx.app,
        None,
        "POST",
        "/api/v1/auth/login",
        Some(json!({ "email": email, "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());

    let user = User::find_by_email(&ctx.db, &email).await.unwrap().unwrap();
    User::delete(&ctx.db, user.id).await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_user_without_family_is_forbidden() {
    let ctx = TestContext::new().await.unwrap();
    let loner = create_user(&ctx.db, "loner").await.unwrap();
    let auth = format!("Bearer {}", token_for(&loner, &ctx.config).unwrap());

    let (status, _) = send_as(&ctx.app, Some(&auth), "GET", "/api/v1/members", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    User::delete(&ctx.db, loner.id).await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_join_family_by_invite_code() {
    let ctx = TestContext::new().await.unwrap();
    let joiner = create_user(&ctx.db, "joiner").await.unwrap();
    let auth = format!("Bearer {}", token_for(&joiner, &ctx.config).unwrap());

    let (status, _) = send_as(
        &ctx.app,
        Some(&auth),
        "POST",
        "/api/v1/family/join",
        Some(json!({ "inviteCode": "ZZZZZZZZ" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_as(
        &ctx.app,
        Some(&auth),
        "POST",
        "/api/v1/family/join",
        Some(json!({ "inviteCode": ctx.family.invite_code.to_lowercase() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "join failed: {body}");
    assert_eq!(body["id"], json!(ctx.family.id));
    assert_eq!(body["users"].as_array().unwrap().len(), 2);

    let (status, _) = send_as(
        &ctx.app,
        Some(&auth),
        "POST",
        "/api/v1/family",
        Some(json!({ "name": "第二个家庭" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    User::delete(&ctx.db, joiner.id).await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_only_one_self_member() {
    let ctx = TestContext::new().await.unwrap();

    create_member(&ctx, "我", "SELF", "1985-06-01").await;

    let (status, _) = ctx
        .send(
            "POST",
            "/api/v1/members",
            Some(json!({
                "name": "另一个我",
                "relationship": "SELF",
                "gender": "FEMALE",
                "birthDate": "1990-01-01",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx.send("GET", "/api/v1/members", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_record_flags_abnormal_values() {
    let ctx = TestContext::new().await.unwrap();
    let member = create_member(&ctx, "爸爸", "FATHER", "1960-03-15").await;

    let (status, body) = ctx
        .send(
            "POST",
            "/api/v1/records",
            Some(json!({
                "memberId": member["id"],
                "recordDate": "2024-05-01T08:00:00Z",
                "recordType": "SYSTOLIC_BP",
                "value": 150.0,
                "unit": "mmHg",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create record failed: {body}");
    assert_eq!(body["isAbnormal"], true);

    let (status, body) = ctx
        .send(
            "POST",
            "/api/v1/records",
            Some(json!({
                "memberId": member["id"],
                "recordDate": "2024-05-01T08:00:00Z",
                "recordType": "SYSTOLIC_BP",
                "value": 120.0,
                "unit": "mmHg",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["isAbnormal"], false);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_other_family_member_is_forbidden() {
    let ctx = TestContext::new().await.unwrap();
    let other = TestContext::new().await.unwrap();
    let member = create_member(&other, "邻居", "OTHER", "1970-01-01").await;

    let uri = format!("/api/v1/members/{}", member["id"].as_str().unwrap());
    let (status, _) = ctx.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    other.cleanup().await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_reference_data() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = ctx.send("GET", "/api/v1/records/reference-ranges", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 15);

    let (status, body) = ctx.send("GET", "/api/v1/vaccinations/definitions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["all"].as_array().unwrap().len(), 17);

    let (status, body) = ctx.send("GET", "/api/v1/checkups/templates", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 7);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_vaccination_duplicate_dose_conflicts() {
    let ctx = TestContext::new().await.unwrap();
    let member = create_member(&ctx, "宝宝", "SON", "2023-01-10").await;

    let record = json!({
        "memberId": member["id"],
        "vaccineCode": "BCG",
        "vaccineName": "卡介苗",
        "doseNumber": 1,
        "vaccinatedAt": "2023-01-11",
    });

    let (status, body) = ctx.send("POST", "/api/v1/vaccinations", Some(record.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "create vaccination failed: {body}");

    let (status, _) = ctx.send("POST", "/api/v1/vaccinations", Some(record)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/api/v1/vaccinations/schedule/{}", member["id"].as_str().unwrap());
    let (status, _) = ctx.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_checkup_item_lifecycle() {
    let ctx = TestContext::new().await.unwrap();
    let member = create_member(&ctx, "妈妈", "MOTHER", "1962-08-20").await;

    let (status, item) = ctx
        .send(
            "POST",
            "/api/v1/checkups/items",
            Some(json!({ "memberId": member["id"], "name": "洗牙", "intervalMonths": 6 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create item failed: {item}");
    assert_eq!(item["status"], "pending");

    let uri = format!("/api/v1/checkups/items/{}/records", item["id"].as_str().unwrap());
    let today = chrono::Utc::now().date_naive().to_string();
    let (status, body) = ctx.send("POST", &uri, Some(json!({ "checkDate": today }))).await;
    assert_eq!(status, StatusCode::CREATED, "create checkup record failed: {body}");

    let (status, summary) = ctx.send("GET", "/api/v1/checkups/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["totalPending"], 0);

    ctx.cleanup().await.unwrap();
}

fn id_of(body: &Value) -> Uuid {
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_blood_pressure(ctx: &TestContext, member: &Value, value: f64) {
    let measured_at = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
    let (status, body) = ctx
        .send(
            "POST",
            "/api/v1/records",
            Some(json!({
                "memberId": member["id"],
                "recordDate": measured_at,
                "recordType": "SYSTOLIC_BP",
                "value": value,
                "unit": "mmHg",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create record failed: {body}");
}

#[tokio::test]
async fn test_owner_cannot_leave_while_others_remain() {
    let ctx = TestContext::new().await.unwrap();
    let child = create_member(&ctx, "小明", "SON", "2015-03-03").await;

    let joiner = create_user(&ctx.db, "joiner").await.unwrap();
    let auth = format!("Bearer {}", token_for(&joiner, &ctx.config).unwrap());
    let (status, body) = send_as(
        &ctx.app,
        Some(&auth),
        "POST",
        "/api/v1/family/join",
        Some(json!({ "inviteCode": ctx.family.invite_code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "join failed: {body}");

    let (status, body) = ctx.send("DELETE", "/api/v1/family/leave", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "owner left a shared family: {body}");
    assert_eq!(body["error"], "forbidden");

    let uri = format!("/api/v1/members/{}/link", child["id"].as_str().unwrap());
    let (status, body) = send_as(&ctx.app, Some(&auth), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK, "link failed: {body}");
    assert_eq!(body["userId"], json!(joiner.id));

    let (status, _) = send_as(&ctx.app, Some(&auth), "DELETE", "/api/v1/family/leave", None).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/v1/members/{}", child["id"].as_str().unwrap());
    let (status, body) = ctx.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["userId"].is_null(), "leaving must unlink the member: {body}");

    let joiner = User::find_by_id(&ctx.db, joiner.id).await.unwrap().unwrap();
    assert!(joiner.family_id.is_none());
    assert!(Family::find_by_id(&ctx.db, ctx.family.id).await.unwrap().is_some());

    User::delete(&ctx.db, joiner.id).await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_last_user_leaving_keeps_health_data() {
    let ctx = TestContext::new().await.unwrap();
    let member = create_member(&ctx, "外婆", "GRANDMOTHER", "1945-09-09").await;
    create_blood_pressure(&ctx, &member, 150.0).await;
    let member_id = id_of(&member);

    let (status, body) = ctx.send("DELETE", "/api/v1/family/leave", None).await;
    assert_eq!(status, StatusCode::OK, "leave failed: {body}");

    let user = User::find_by_id(&ctx.db, ctx.user.id).await.unwrap().unwrap();
    assert!(user.family_id.is_none());
    assert!(Family::find_by_id(&ctx.db, ctx.family.id).await.unwrap().is_none());
    assert!(Family::find_by_invite_code(&ctx.db, &ctx.family.invite_code)
        .await
        .unwrap()
        .is_none());

    let member_hidden: bool = sqlx::query_scalar("SELECT deleted_at IS NOT NULL FROM family_members WHERE id = $1")
        .bind(member_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert!(member_hidden, "member row must survive as soft-deleted");

    let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM health_records WHERE member_id = $1")
        .bind(member_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(records, 1, "health records must outlive the family");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_first_email_bootstraps_whitelist() {
    let ctx = TestContext::new().await.unwrap();
    let first = format!("first-{}@example.com", Uuid::new_v4());
    let second = format!("second-{}@example.com", Uuid::new_v4());

    // Rolled back below; the lock keeps concurrent tests from refilling the
    // table in between.
    let mut tx = ctx.db.begin().await.unwrap();
    sqlx::query("LOCK TABLE allowed_emails IN EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await
        .unwrap();
    sqlx::query("DELETE FROM allowed_emails").execute(&mut *tx).await.unwrap();

    ensure_allowed(&mut tx, &first).await.unwrap();
    assert!(AllowedEmail::contains(&mut *tx, &first).await.unwrap());
    assert_eq!(AllowedEmail::count(&mut *tx).await.unwrap(), 1);

    let result = ensure_allowed(&mut tx, &second).await;
    assert!(
        matches!(&result, Err(ApiError::Forbidden(msg)) if msg == "account not authorized"),
        "second email must be rejected: {result:?}"
    );
    assert!(!AllowedEmail::contains(&mut *tx, &second).await.unwrap());

    tx.rollback().await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_login_rejected_after_whitelist_removal() {
    let ctx = TestContext::new().await.unwrap();
    let email = format!("revoked-{}@example.com", Uuid::new_v4());
    AllowedEmail::add(&ctx.db, &email, "tests").await.unwrap();

    let (status, body) = send_as(
        &ctx.app,
        None,
        "POST",
        "/api/v1/auth/register",
        Some(json!({ "name": "临时用户", "email": email, "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    AllowedEmail::remove(&ctx.db, &email).await.unwrap();

    let (status, body) = send_as(
        &ctx.app,
        None,
        "POST",
        "/api/v1/auth/login",
        Some(json!({ "email": email, "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "account not authorized");

    let user = User::find_by_email(&ctx.db, &email).await.unwrap().unwrap();
    User::delete(&ctx.db, user.id).await.unwrap();
    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_chat_reply_is_stored_and_titles_session() {
    let reply = "建议您少盐饮食，两周后复查血压。";
    let ctx = TestContext::with_model(reply).await.unwrap();
    let member = create_member(&ctx, "爸爸", "FATHER", "1960-01-01").await;

    let (status, session) = ctx
        .send("POST", "/api/v1/chat/sessions", Some(json!({ "memberId": member["id"] })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "create session failed: {session}");
    let uri = format!("/api/v1/chat/sessions/{}", session["id"].as_str().unwrap());

    let question = "  我爸最近血压有点高怎么办  ";
    let (status, stream) = ctx
        .send("POST", &format!("{uri}/messages"), Some(json!({ "content": question })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let stream = stream.as_str().unwrap();
    assert!(stream.contains("event: message"), "no deltas streamed: {stream}");
    assert!(stream.contains("event: done"), "stream did not finish: {stream}");
    assert!(stream.contains(&format!("\"tokensUsed\":{STUB_TOKENS}")));

    let (status, detail) = ctx.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], "我爸最近血压有点高怎么办");
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], reply);

    let (status, _) = ctx
        .send("POST", &format!("{uri}/messages"), Some(json!({ "content": "需要吃药吗" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = ctx.send("GET", &uri, None).await;
    assert_eq!(detail["messages"].as_array().unwrap().len(), 4);
    assert_eq!(detail["title"], "我爸最近血压有点高怎么办", "only the first exchange names the session");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_empty_model_reply_is_not_stored() {
    let ctx = TestContext::with_model("").await.unwrap();
    let member = create_member(&ctx, "妈妈", "MOTHER", "1962-08-20").await;

    let (status, session) = ctx
        .send("POST", "/api/v1/chat/sessions", Some(json!({ "memberId": member["id"] })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/v1/chat/sessions/{}", session["id"].as_str().unwrap());

    let (status, stream) = ctx
        .send("POST", &format!("{uri}/messages"), Some(json!({ "content": "你好" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(stream.as_str().unwrap().contains("event: done"));

    let (_, detail) = ctx.send("GET", &uri, None).await;
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_generate_advice_from_model_reply() {
    let reply = r#"```json
{"healthScore": 78, "summary": "血压偏高，需要关注",
 "concerns": [{"level": "warning", "title": "血压", "description": "收缩压150"}],
 "suggestions": [{"category": "饮食", "content": "减少盐摄入"}],
 "actionItems": [{"priority": "high", "action": "两周后复查血压"}]}
```"#;
    let ctx = TestContext::with_model(reply).await.unwrap();

    let empty = create_member(&ctx, "小红", "DAUGHTER", "2018-04-04").await;
    let (status, body) = ctx
        .send("POST", "/api/v1/advice/generate", Some(json!({ "memberId": empty["id"] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "advice without data: {body}");

    let member = create_member(&ctx, "爷爷", "GRANDFATHER", "1940-02-02").await;
    create_blood_pressure(&ctx, &member, 150.0).await;

    let (status, advice) = ctx
        .send("POST", "/api/v1/advice/generate", Some(json!({ "memberId": member["id"] })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "generate failed: {advice}");
    assert_eq!(advice["healthScore"], 78);
    assert_eq!(advice["summary"], "血压偏高，需要关注");
    assert_eq!(advice["concerns"].as_array().unwrap().len(), 1);
    assert_eq!(advice["tokensUsed"], STUB_TOKENS);
    assert_eq!(advice["member"]["name"], "爷爷");

    let (status, list) = ctx.send("GET", "/api/v1/advice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.to_string().contains(advice["id"].as_str().unwrap()));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_document_analysis_conflict_and_completion() {
    let formatted = "## 血常规\n\n| 项目 | 结果 |\n| --- | --- |\n| 白细胞 | 5.2 |";
    let ctx = TestContext::with_model(formatted).await.unwrap();
    let member = create_member(&ctx, "哥哥", "OTHER", "1988-12-12").await;

    let (status, document) = ctx
        .send(
            "POST",
            "/api/v1/documents",
            Some(json!({
                "memberId": member["id"],
                "type": "LAB_REPORT",
                "name": "血常规",
                "checkDate": "2024-05-01",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create document failed: {document}");
    let document_id = id_of(&document);
    let uri = format!("/api/v1/documents/{document_id}");

    let (status, _) = ctx.send("POST", &format!("{uri}/analyze"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "analysis needs OCR text first");

    let (status, _) = ctx
        .send("PATCH", &format!("{uri}/ocr"), Some(json!({ "ocrText": "白细胞 5.2" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert!(HealthDocument::begin_analysis(&ctx.db, document_id).await.unwrap());
    let (status, body) = ctx.send("POST", &format!("{uri}/analyze"), None).await;
    assert_eq!(status, StatusCode::CONFLICT, "second run must be refused: {body}");

    HealthDocument::fail_analysis(&ctx.db, document_id, "interrupted").await.unwrap();
    let (status, body) = ctx.send("POST", &format!("{uri}/analyze"), None).await;
    assert_eq!(status, StatusCode::OK, "retry after failure refused: {body}");
    assert_eq!(body["status"], "processing");

    let mut state = Value::Null;
    for _ in 0..50 {
        let (_, body) = ctx.send("GET", &format!("{uri}/analyze"), None).await;
        if body["status"] != "processing" {
            state = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(state["status"], "completed", "analysis did not finish: {state}");
    assert_eq!(state["parsedData"]["type"], "markdown");
    assert_eq!(state["parsedData"]["content"], formatted);

    ctx.cleanup().await.unwrap();
}
